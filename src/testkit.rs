//! Scripted game screens for tests
//!
//! [`FakeGame`] implements every collaborator trait at once. It holds a
//! graph of screens; clicking an element with a target, scrolling, or
//! waiting long enough on a timed screen moves to another screen. OCR reads
//! the caption of the smallest captioned element under the query box, and
//! the activity classifier reads the brightness painted for an element.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use crate::clock::Clock;
use crate::input::{InputController, ScrollDirection};
use crate::vision::{ActivityClassifier, BBox, Detection, Detector, Frame, OcrEngine, OcrResult};
use crate::Toolkit;

const FRAME_WIDTH: u32 = 420;
const FRAME_HEIGHT: u32 = 820;
const OCR_CONFIDENCE: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenId(usize);

/// One on-screen element
#[derive(Debug, Clone)]
pub struct Element {
    label: String,
    bbox: BBox,
    confidence: f32,
    text: Option<String>,
    detectable: bool,
    active: Option<f32>,
    goto: Option<ScreenId>,
    paint: Option<RgbaImage>,
}

impl Element {
    /// Detectable element with confidence 0.9
    pub fn new(label: &str, bbox: BBox) -> Self {
        Self {
            label: label.to_string(),
            bbox,
            confidence: 0.9,
            text: None,
            detectable: true,
            active: None,
            goto: None,
            paint: None,
        }
    }

    /// Caption OCR reads back
    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Paint the element with a brightness the classifier reads back
    pub fn active(mut self, probability: f32) -> Self {
        self.active = Some(probability);
        self
    }

    /// Screen a click on this element switches to
    pub fn goto(mut self, screen: ScreenId) -> Self {
        self.goto = Some(screen);
        self
    }

    /// Readable by OCR but not reported by the detector
    pub fn hidden(mut self) -> Self {
        self.detectable = false;
        self
    }

    /// Draw an image at the element's top-left corner
    pub fn paint(mut self, image: RgbaImage) -> Self {
        self.paint = Some(image);
        self
    }
}

#[derive(Debug, Clone)]
struct Screen {
    name: String,
    elements: Vec<Element>,
    advance_after: Option<(Duration, ScreenId)>,
    scroll_down: Option<ScreenId>,
    scroll_up: Option<ScreenId>,
}

/// A click as the game saw it
#[derive(Debug, Clone, PartialEq)]
pub struct ClickRecord {
    pub x: i32,
    pub y: i32,
    pub screen: String,
    pub label: Option<String>,
    pub text: Option<String>,
}

/// Scripted game implementing every collaborator
pub struct FakeGame {
    screens: Vec<Screen>,
    current: Cell<usize>,
    entered_at: Cell<Instant>,
    started: Instant,
    now: Cell<Instant>,
    next_frame: Cell<u64>,
    frame_screens: RefCell<HashMap<u64, usize>>,
    clicks: RefCell<Vec<ClickRecord>>,
    scrolls: RefCell<Vec<ScrollDirection>>,
    ocr_calls: Cell<usize>,
}

impl FakeGame {
    pub fn new() -> Self {
        let started = Instant::now();
        Self {
            screens: Vec::new(),
            current: Cell::new(0),
            entered_at: Cell::new(started),
            started,
            now: Cell::new(started),
            next_frame: Cell::new(1),
            frame_screens: RefCell::new(HashMap::new()),
            clicks: RefCell::new(Vec::new()),
            scrolls: RefCell::new(Vec::new()),
            ocr_calls: Cell::new(0),
        }
    }

    /// Add a screen; the first one added is shown first
    pub fn add_screen(&mut self, name: &str) -> ScreenId {
        self.screens.push(Screen {
            name: name.to_string(),
            elements: Vec::new(),
            advance_after: None,
            scroll_down: None,
            scroll_up: None,
        });
        ScreenId(self.screens.len() - 1)
    }

    pub fn add(&mut self, screen: ScreenId, element: Element) {
        self.screens[screen.0].elements.push(element);
    }

    /// Move from `screen` to `target` once `after` has passed on it
    pub fn advance_after(&mut self, screen: ScreenId, after: Duration, target: ScreenId) {
        self.screens[screen.0].advance_after = Some((after, target));
    }

    /// Scrolling down on `upper` shows `lower`, and back
    pub fn link_scroll(&mut self, upper: ScreenId, lower: ScreenId) {
        self.screens[upper.0].scroll_down = Some(lower);
        self.screens[lower.0].scroll_up = Some(upper);
    }

    /// Point the element captioned `text` on `screen` at another screen
    pub fn retarget(&mut self, screen: ScreenId, text: &str, target: ScreenId) {
        for element in &mut self.screens[screen.0].elements {
            if element.text.as_deref() == Some(text) {
                element.goto = Some(target);
            }
        }
    }

    pub fn start_at(&mut self, screen: ScreenId) {
        self.current.set(screen.0);
    }

    pub fn toolkit(&self) -> Toolkit<'_> {
        Toolkit::new(self, self, self, self, self)
    }

    pub fn ocr_calls(&self) -> usize {
        self.ocr_calls.get()
    }

    /// Frames captured so far
    pub fn captures(&self) -> u64 {
        self.next_frame.get() - 1
    }

    /// Fake time passed since creation
    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.started
    }

    pub fn clicks(&self) -> Vec<ClickRecord> {
        self.clicks.borrow().clone()
    }

    pub fn clicks_on(&self, text: &str) -> usize {
        self.clicks
            .borrow()
            .iter()
            .filter(|c| c.text.as_deref() == Some(text))
            .count()
    }

    pub fn clicks_on_screen(&self, screen: &str, text: &str) -> usize {
        self.clicks
            .borrow()
            .iter()
            .filter(|c| c.screen == screen && c.text.as_deref() == Some(text))
            .count()
    }

    pub fn scrolls(&self) -> Vec<ScrollDirection> {
        self.scrolls.borrow().clone()
    }

    pub fn current_screen(&self) -> String {
        self.screens
            .get(self.current.get())
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn switch_to(&self, screen: ScreenId) {
        self.current.set(screen.0);
        self.entered_at.set(self.now.get());
    }

    fn screen_of(&self, frame: &Frame) -> Option<&Screen> {
        let index = *self.frame_screens.borrow().get(&frame.id)?;
        self.screens.get(index)
    }

    fn render(&self, screen: &Screen) -> RgbaImage {
        let mut image = RgbaImage::new(FRAME_WIDTH, FRAME_HEIGHT);
        for element in &screen.elements {
            if let Some(active) = element.active {
                let v = (active.clamp(0.0, 1.0) * 255.0) as u8;
                if let Some((x, y, w, h)) = element.bbox.to_crop_rect(FRAME_WIDTH, FRAME_HEIGHT) {
                    for py in y..y + h {
                        for px in x..x + w {
                            image.put_pixel(px, py, Rgba([v, v, v, 255]));
                        }
                    }
                }
            }
            if let Some(paint) = &element.paint {
                image::imageops::replace(
                    &mut image,
                    paint,
                    element.bbox.x0 as i64,
                    element.bbox.y0 as i64,
                );
            }
        }
        image
    }
}

impl InputController for FakeGame {
    fn capture_frame(&self) -> Frame {
        if let Some(screen) = self.screens.get(self.current.get()) {
            if let Some((after, target)) = screen.advance_after {
                if self.now.get() - self.entered_at.get() >= after {
                    self.switch_to(target);
                }
            }
        }

        let id = self.next_frame.get();
        self.next_frame.set(id + 1);
        let index = self.current.get();
        self.frame_screens.borrow_mut().insert(id, index);

        match self.screens.get(index) {
            Some(screen) => Frame::new(id, self.render(screen)),
            None => Frame::blank(id, FRAME_WIDTH, FRAME_HEIGHT),
        }
    }

    fn click(&self, x: i32, y: i32) {
        let Some(screen) = self.screens.get(self.current.get()) else {
            return;
        };
        let hit = screen
            .elements
            .iter()
            .filter(|e| e.detectable && e.bbox.contains(x as f32, y as f32))
            .min_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()));

        self.clicks.borrow_mut().push(ClickRecord {
            x,
            y,
            screen: screen.name.clone(),
            label: hit.map(|e| e.label.clone()),
            text: hit.and_then(|e| e.text.clone()),
        });

        if let Some(target) = hit.and_then(|e| e.goto) {
            self.switch_to(target);
        }
    }

    fn scroll(&self, _region: &BBox, direction: ScrollDirection) {
        self.scrolls.borrow_mut().push(direction);
        let Some(screen) = self.screens.get(self.current.get()) else {
            return;
        };
        let target = match direction {
            ScrollDirection::Down => screen.scroll_down,
            ScrollDirection::Up => screen.scroll_up,
        };
        if let Some(target) = target {
            self.switch_to(target);
        }
    }
}

impl Detector for FakeGame {
    fn detect(&self, frame: &Frame) -> Vec<Detection> {
        self.screen_of(frame)
            .map(|screen| {
                screen
                    .elements
                    .iter()
                    .filter(|e| e.detectable)
                    .map(|e| Detection::new(e.label.clone(), e.bbox, e.confidence))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl OcrEngine for FakeGame {
    fn read(&self, frame: &Frame, bbox: &BBox) -> OcrResult {
        self.ocr_calls.set(self.ocr_calls.get() + 1);
        let (cx, cy) = bbox.center();
        self.screen_of(frame)
            .and_then(|screen| {
                screen
                    .elements
                    .iter()
                    .filter(|e| e.text.is_some() && e.bbox.contains(cx, cy))
                    .min_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
            })
            .and_then(|e| e.text.as_deref())
            .map_or_else(OcrResult::empty, |text| OcrResult::new(text, OCR_CONFIDENCE))
    }
}

impl ActivityClassifier for FakeGame {
    fn predict_active(&self, crop: &RgbaImage) -> f32 {
        let pixels = crop.width() as u64 * crop.height() as u64;
        if pixels == 0 {
            return 0.0;
        }
        let red: u64 = crop.pixels().map(|p| u64::from(p[0])).sum();
        red as f32 / (pixels as f32 * 255.0)
    }
}

impl Clock for FakeGame {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}
