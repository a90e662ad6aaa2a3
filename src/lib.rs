//! Uma Pilot - decision core for automated Umamusume race flows
//!
//! This library decides what to click in the race part of a career run:
//! which race card on the race list is the scheduled one, whether the
//! lobby should view results or start the race, and how to recover from a
//! lost race with the try-again control without ever clicking the main
//! race control by mistake.
//!
//! Perception and input are collaborators behind traits ([`vision::Detector`],
//! [`vision::OcrEngine`], [`vision::ActivityClassifier`],
//! [`input::InputController`], [`clock::Clock`]), bundled per call in a
//! [`Toolkit`].
//!
//! ## Anti-Detection
//!
//! The `stealth` module jitters click points inside the chosen control and
//! adds variance to the waits after each click.

pub mod ai;
pub mod clock;
pub mod config;
pub mod flow;
pub mod game;
pub mod input;
pub mod stealth;
pub mod vision;

#[cfg(test)]
pub(crate) mod testkit;

use std::path::Path;

use crate::ai::RaceResolver;
use crate::clock::Clock;
use crate::config::Settings;
use crate::flow::{FlowError, RaceFlow, RaceReport};
use crate::game::{EntityIndex, LobbyPlan, RetrySession};
use crate::input::InputController;
use crate::stealth::Humanizer;
use crate::vision::{
    ActivityClassifier, BannerMatcher, Detection, Detector, Frame, OcrEngine, VisionError,
};

/// Image extensions accepted as banner templates
const BANNER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// The collaborators one decision needs
#[derive(Clone, Copy)]
pub struct Toolkit<'a> {
    pub input: &'a dyn InputController,
    pub detector: &'a dyn Detector,
    pub ocr: &'a dyn OcrEngine,
    pub classifier: &'a dyn ActivityClassifier,
    pub clock: &'a dyn Clock,
}

impl<'a> Toolkit<'a> {
    /// Bundle the five collaborators
    pub fn new(
        input: &'a dyn InputController,
        detector: &'a dyn Detector,
        ocr: &'a dyn OcrEngine,
        classifier: &'a dyn ActivityClassifier,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            input,
            detector,
            ocr,
            classifier,
            clock,
        }
    }

    /// Capture a fresh frame and run the detector on it
    pub fn observe(&self) -> (Frame, Vec<Detection>) {
        let frame = self.input.capture_frame();
        let detections = self.detector.detect(&frame);
        (frame, detections)
    }
}

/// Settings, race index and banner matcher for one career run
pub struct Pilot {
    pub settings: Settings,
    pub index: EntityIndex,
    pub matcher: BannerMatcher,
}

impl Pilot {
    /// Create a pilot with the given settings and race index
    pub fn new(settings: Settings, index: EntityIndex) -> Self {
        let matcher = BannerMatcher::new(settings.banner.clone());
        Self {
            settings,
            index,
            matcher,
        }
    }

    /// Register every image in `dir` as a banner template named after its
    /// file stem. Returns the number of templates loaded.
    pub fn load_banners(&mut self, dir: &Path) -> Result<usize, VisionError> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| BANNER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_image {
                continue;
            }

            let name = name.replace(|c: char| c == '_' || c == '-', " ");
            let template = self.matcher.template_from_path(&name, &path)?;
            log::debug!("Banner template '{}' from {}", name, path.display());
            self.index.register_banner(template);
            loaded += 1;
        }

        log::info!("Loaded {} banner templates from {}", loaded, dir.display());
        Ok(loaded)
    }

    /// Race card resolver over this pilot's index and banners
    pub fn resolver(&self) -> RaceResolver<'_> {
        RaceResolver::new(&self.index, &self.matcher, self.settings.resolver.clone())
            .with_min_ocr_confidence(self.settings.selector.min_ocr_confidence)
    }

    /// Race flow with entropy-seeded click humanization
    pub fn race_flow(&self) -> Result<RaceFlow, FlowError> {
        RaceFlow::new(&self.settings, Humanizer::new(self.settings.stealth.clone()))
    }

    /// Run one race. With a plan the race list is resolved first; without
    /// one the flow starts in the lobby.
    pub fn run_race(
        &self,
        kit: &Toolkit<'_>,
        plan: Option<&LobbyPlan>,
        session: RetrySession,
    ) -> Result<RaceReport, FlowError> {
        let mut flow = self.race_flow()?;
        match plan {
            Some(plan) => flow.run_scheduled(kit, &self.resolver(), plan, session),
            None => flow.run(kit, session),
        }
    }
}
