//! Race state machine
//!
//! ```text
//! SelectRace -> Lobby -> RaceRunning -> ResultSkipLoop -> TryAgainDecision
//!                 ^                                          |        |
//!                 +------------- RetryTransition <-----------+     Advance -> Done
//! ```
//!
//! Every phase observes fresh frames through the [`Toolkit`] and clicks only
//! what a [`MatchPolicy`] authorizes. Retry bookkeeping lives in the
//! caller's [`RetrySession`].

use super::{FlowError, LobbyAction, LobbyResolver, RaceOutcome, RaceReport};
use crate::ai::{MatchPolicy, RaceResolver, Selector};
use crate::clock::Deadline;
use crate::config::settings::{RaceFlowSettings, Settings, Vocabulary};
use crate::game::state::{LobbyEntry, LobbyPlan, RacePhase, RetrySession};
use crate::stealth::Humanizer;
use crate::vision::labels::{BUTTON_GREEN, BUTTON_SKIP, BUTTON_WHITE};
use crate::vision::BBox;
use crate::Toolkit;

/// Validated policies for every control the flow clicks or probes
#[derive(Debug, Clone)]
struct FlowPolicies {
    race_confirm: MatchPolicy,
    skip: MatchPolicy,
    skip_caption: MatchPolicy,
    loss_probe: MatchPolicy,
    retry: MatchPolicy,
    advance: MatchPolicy,
    confirm: MatchPolicy,
    terminal_review: MatchPolicy,
    terminal_action: MatchPolicy,
}

fn joined(lists: &[&Vec<String>]) -> Vec<String> {
    lists.iter().flat_map(|l| l.iter().cloned()).collect()
}

impl FlowPolicies {
    fn build(settings: &Settings) -> Result<Self, FlowError> {
        let race = &settings.race;
        let vocab: &Vocabulary = &settings.vocabulary;
        let click_timeout = settings.selector.click_timeout();
        let poll = settings.selector.poll_interval();

        Ok(Self {
            race_confirm: MatchPolicy::builder("race_confirm", [BUTTON_GREEN])
                .expect(vocab.race_confirm.iter().cloned())
                .forbid(joined(&[&vocab.try_again, &vocab.advance]))
                .greedy(false)
                .prefer_bottom(true)
                .timeout(click_timeout)
                .poll_interval(poll)
                .build()?,
            skip: MatchPolicy::builder("skip", [BUTTON_SKIP])
                .timeout(click_timeout)
                .poll_interval(poll)
                .build()?,
            skip_caption: MatchPolicy::builder("skip_caption", [BUTTON_WHITE, BUTTON_GREEN])
                .expect(vocab.skip.iter().cloned())
                .forbid(joined(&[&vocab.try_again, &vocab.advance, &vocab.terminal_action]))
                .greedy(false)
                .timeout(click_timeout)
                .poll_interval(poll)
                .build()?,
            loss_probe: MatchPolicy::builder("loss_probe", [BUTTON_GREEN])
                .expect(vocab.try_again.iter().cloned())
                .forbid(vocab.advance.iter().cloned())
                .greedy(false)
                .min_confidence(race.loss_min_confidence)
                .timeout(race.loss_probe_timeout())
                .poll_interval(poll)
                .build()?,
            retry: MatchPolicy::builder("retry", [BUTTON_GREEN])
                .expect(vocab.try_again.iter().cloned())
                .forbid(joined(&[&vocab.terminal_action, &vocab.advance]))
                .greedy(false)
                .timeout(click_timeout)
                .poll_interval(poll)
                .build()?,
            advance: MatchPolicy::builder("advance", [BUTTON_GREEN, BUTTON_WHITE])
                .expect(vocab.advance.iter().cloned())
                .forbid(vocab.try_again.iter().cloned())
                .greedy(false)
                .timeout(click_timeout)
                .poll_interval(poll)
                .build()?,
            confirm: MatchPolicy::builder("retry_confirm", [BUTTON_GREEN])
                .expect(vocab.confirmations.iter().cloned())
                .forbid(joined(&[
                    &vocab.terminal_review,
                    &vocab.terminal_action,
                    &vocab.try_again,
                ]))
                .greedy(false)
                .build()?,
            terminal_review: MatchPolicy::builder("terminal_review", [BUTTON_WHITE])
                .expect(vocab.terminal_review.iter().cloned())
                .greedy(false)
                .min_confidence(race.terminal_min_confidence)
                .build()?,
            terminal_action: MatchPolicy::builder("terminal_action", [BUTTON_GREEN])
                .expect(vocab.terminal_action.iter().cloned())
                .forbid(joined(&[&vocab.try_again, &vocab.confirmations]))
                .greedy(false)
                .min_confidence(race.terminal_min_confidence)
                .build()?,
        })
    }
}

/// Drives one race through its phases
pub struct RaceFlow {
    settings: RaceFlowSettings,
    selector: Selector,
    lobby: LobbyResolver,
    humanizer: Humanizer,
    policies: FlowPolicies,
}

impl RaceFlow {
    /// Create a flow; fails if the settings produce an invalid policy
    pub fn new(settings: &Settings, humanizer: Humanizer) -> Result<Self, FlowError> {
        settings.validate()?;
        let selector = Selector::new(settings.selector.clone());
        let lobby = LobbyResolver::new(
            settings.lobby.clone(),
            &settings.vocabulary,
            selector.clone(),
        )?;

        Ok(Self {
            settings: settings.race.clone(),
            selector,
            lobby,
            humanizer,
            policies: FlowPolicies::build(settings)?,
        })
    }

    /// Run from the pre-race lobby
    pub fn run(
        &mut self,
        kit: &Toolkit<'_>,
        session: RetrySession,
    ) -> Result<RaceReport, FlowError> {
        self.run_from(kit, RacePhase::Lobby, Vec::new(), session)
    }

    /// Pick the scheduled card on the race list, confirm it and run the race
    pub fn run_scheduled(
        &mut self,
        kit: &Toolkit<'_>,
        resolver: &RaceResolver<'_>,
        plan: &LobbyPlan,
        session: RetrySession,
    ) -> Result<RaceReport, FlowError> {
        let mut phases = vec![RacePhase::SelectRace];

        if session.deadline_passed(kit.clock.now()) {
            phases.push(RacePhase::Aborted);
            return Ok(Self::report(RaceOutcome::DeadlineExceeded, phases, session, 0));
        }

        let Some(resolution) = resolver.resolve(kit, plan) else {
            log::warn!("No eligible race card for {:?}", plan.planned_entity_name);
            phases.push(RacePhase::Aborted);
            return Ok(Self::report(RaceOutcome::NoEligibleRace, phases, session, 0));
        };

        log::info!(
            "Selecting race card on page {} ({:?}, score {:.2})",
            resolution.page,
            resolution.kind,
            resolution.candidate.adjusted_score
        );
        self.click(kit, resolution.card.bbox());

        let Some(confirm) = self.selector.select(kit, &self.policies.race_confirm) else {
            return Err(FlowError::ControlNotFound {
                tag: self.policies.race_confirm.tag().to_string(),
                phase: RacePhase::SelectRace,
            });
        };
        self.click(kit, confirm.bbox());
        self.second_confirm(kit);

        self.run_from(kit, RacePhase::Lobby, phases, session)
    }

    /// Click an optional second race confirmation, stopping as soon as the
    /// lobby is on screen
    fn second_confirm(&mut self, kit: &Toolkit<'_>) {
        let deadline = Deadline::after(kit.clock, self.settings.second_confirm_timeout());
        loop {
            let (frame, detections) = kit.observe();
            if self
                .selector
                .observed_on(&frame, &detections, &self.policies.terminal_review, kit.ocr)
            {
                return;
            }
            if let Some(confirm) =
                self.selector
                    .evaluate(&frame, &detections, &self.policies.race_confirm, kit.ocr)
            {
                log::debug!("Second race confirmation");
                self.click(kit, confirm.bbox());
                return;
            }
            if deadline.expired(kit.clock) {
                return;
            }
            kit.clock.sleep(
                self.settings
                    .retry_transition_poll()
                    .min(deadline.remaining(kit.clock)),
            );
        }
    }

    fn run_from(
        &mut self,
        kit: &Toolkit<'_>,
        start: RacePhase,
        mut phases: Vec<RacePhase>,
        mut session: RetrySession,
    ) -> Result<RaceReport, FlowError> {
        let mut phase = start;
        let mut entry = LobbyEntry::Fresh;
        let mut confirmation_clicks = 0;

        let outcome = loop {
            if session.deadline_passed(kit.clock.now()) {
                log::warn!("Race deadline passed before {:?}", phase);
                phases.push(RacePhase::Aborted);
                break RaceOutcome::DeadlineExceeded;
            }
            phases.push(phase);

            phase = match phase {
                RacePhase::Lobby => self.lobby_phase(kit, entry)?,
                RacePhase::RaceRunning => self.wait_for_result(kit)?,
                RacePhase::ResultSkipLoop => self.skip_results(kit),
                RacePhase::TryAgainDecision => self.decide_retry(kit, &mut session),
                RacePhase::RetryTransition => {
                    confirmation_clicks += self.retry_transition(kit, &mut session);
                    entry = LobbyEntry::AfterRetry;
                    RacePhase::Lobby
                }
                RacePhase::Advance => self.advance(kit)?,
                RacePhase::SelectRace => RacePhase::Lobby,
                RacePhase::Done => break RaceOutcome::Advanced,
                RacePhase::Aborted => break RaceOutcome::NoEligibleRace,
            };
        };

        log::info!(
            "Race finished: {:?} (losses {}, retries {}/{}, confirmations {})",
            outcome,
            session.loss_count,
            session.retry_successes,
            session.retry_attempts,
            confirmation_clicks
        );
        Ok(Self::report(outcome, phases, session, confirmation_clicks))
    }

    fn report(
        outcome: RaceOutcome,
        phases: Vec<RacePhase>,
        session: RetrySession,
        confirmation_clicks: u32,
    ) -> RaceReport {
        RaceReport {
            outcome,
            phases,
            session,
            confirmation_clicks,
        }
    }

    fn click(&mut self, kit: &Toolkit<'_>, bbox: &BBox) {
        let (x, y) = self.humanizer.click_point(bbox);
        kit.input.click(x, y);
        kit.clock.sleep(self.humanizer.settle_delay());
    }

    fn lobby_phase(
        &mut self,
        kit: &Toolkit<'_>,
        entry: LobbyEntry,
    ) -> Result<RacePhase, FlowError> {
        let action = self.lobby.resolve(kit, entry)?;
        match action {
            LobbyAction::ViewResults(_) => log::info!("Viewing results"),
            LobbyAction::StartRace(_) => log::info!("Starting race"),
        }
        self.click(kit, action.bbox());
        Ok(RacePhase::RaceRunning)
    }

    /// Wait until any result control shows up
    fn wait_for_result(&self, kit: &Toolkit<'_>) -> Result<RacePhase, FlowError> {
        let p = &self.policies;
        let probes = [&p.skip, &p.skip_caption, &p.loss_probe, &p.advance];
        match self.selector.wait_for_any(
            kit,
            &probes,
            self.settings.race_start_timeout(),
            self.settings.result_poll(),
        ) {
            Some(_) => Ok(RacePhase::ResultSkipLoop),
            None => Err(FlowError::RaceStartTimeout(self.settings.race_start_timeout())),
        }
    }

    /// Click through result screens until the loss or advance control is up.
    /// A timeout moves on to the loss probe anyway.
    fn skip_results(&mut self, kit: &Toolkit<'_>) -> RacePhase {
        let deadline = Deadline::after(kit.clock, self.settings.result_timeout());
        let mut skips = 0;
        loop {
            let (frame, detections) = kit.observe();
            let p = &self.policies;
            let stable = self.selector.observed_on(&frame, &detections, &p.loss_probe, kit.ocr)
                || self.selector.observed_on(&frame, &detections, &p.advance, kit.ocr);
            if stable {
                log::debug!("Result screen stable after {} skips", skips);
                return RacePhase::TryAgainDecision;
            }

            let skip = self
                .selector
                .evaluate(&frame, &detections, &p.skip, kit.ocr)
                .or_else(|| {
                    self.selector
                        .evaluate(&frame, &detections, &p.skip_caption, kit.ocr)
                });
            match skip {
                Some(candidate) => {
                    self.click(kit, candidate.bbox());
                    skips += 1;
                }
                None => kit.clock.sleep(self.settings.result_poll()),
            }

            if deadline.expired(kit.clock) {
                log::warn!(
                    "Result screens did not settle within {:?}",
                    self.settings.result_timeout()
                );
                return RacePhase::TryAgainDecision;
            }
        }
    }

    fn decide_retry(&mut self, kit: &Toolkit<'_>, session: &mut RetrySession) -> RacePhase {
        if !self.selector.observed(kit, &self.policies.loss_probe) {
            return RacePhase::Advance;
        }

        session.record_loss();
        log::info!("Race lost (loss #{})", session.loss_count);

        if !self.settings.retry_on_loss {
            log::info!("Retry disabled, advancing");
            return RacePhase::Advance;
        }
        if !session.can_retry(self.settings.max_retries) {
            log::info!(
                "Retry budget spent ({}/{}), advancing",
                session.retry_attempts,
                self.settings.max_retries
            );
            return RacePhase::Advance;
        }

        match self.selector.select(kit, &self.policies.retry) {
            Some(candidate) => {
                self.click(kit, candidate.bbox());
                session.record_retry_attempt();
                log::info!("Retrying race (attempt {})", session.retry_attempts);
                RacePhase::RetryTransition
            }
            None => {
                log::warn!("Loss seen but no retry control to click, advancing");
                RacePhase::Advance
            }
        }
    }

    /// Clear confirmations until the lobby is back. The terminal state and
    /// the confirmation are judged on the same frame, terminal first.
    /// Returns the number of confirmation clicks.
    fn retry_transition(&mut self, kit: &Toolkit<'_>, session: &mut RetrySession) -> u32 {
        let deadline = Deadline::after(kit.clock, self.settings.retry_transition_timeout());
        let mut confirmations = 0;

        loop {
            let (frame, detections) = kit.observe();
            let p = &self.policies;
            let terminal = self
                .selector
                .observed_on(&frame, &detections, &p.terminal_review, kit.ocr)
                || self
                    .selector
                    .observed_on(&frame, &detections, &p.terminal_action, kit.ocr);
            if terminal {
                session.record_retry_success();
                log::info!(
                    "Retry transition reached the lobby after {} confirmations",
                    confirmations
                );
                return confirmations;
            }

            let confirm = self
                .selector
                .evaluate(&frame, &detections, &p.confirm, kit.ocr);
            if let Some(candidate) = confirm {
                log::debug!(
                    "Confirming '{}'",
                    candidate.ocr_text.as_deref().unwrap_or("")
                );
                self.click(kit, candidate.bbox());
                confirmations += 1;
            }

            if deadline.expired(kit.clock) {
                log::warn!(
                    "Retry transition timed out after {:?} ({} confirmations), \
                     re-checking the lobby",
                    self.settings.retry_transition_timeout(),
                    confirmations
                );
                return confirmations;
            }
            kit.clock.sleep(
                self.settings
                    .retry_transition_poll()
                    .min(deadline.remaining(kit.clock)),
            );
        }
    }

    fn advance(&mut self, kit: &Toolkit<'_>) -> Result<RacePhase, FlowError> {
        match self.selector.select(kit, &self.policies.advance) {
            Some(candidate) => {
                self.click(kit, candidate.bbox());
                Ok(RacePhase::Done)
            }
            None => Err(FlowError::ControlNotFound {
                tag: self.policies.advance.tag().to_string(),
                phase: RacePhase::Advance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::game::entity::EntityIndex;
    use crate::stealth::StealthConfig;
    use crate::testkit::{Element, FakeGame, ScreenId};
    use crate::vision::labels::RACE_CARD;
    use crate::vision::BannerMatcher;
    use std::time::Duration;

    fn flow(settings: &Settings) -> RaceFlow {
        RaceFlow::new(settings, Humanizer::seeded(StealthConfig::disabled(), 11)).unwrap()
    }

    fn review(active: f32, goto: ScreenId) -> Element {
        Element::new(BUTTON_WHITE, BBox::new(40.0, 700.0, 200.0, 750.0))
            .text("View Results")
            .active(active)
            .goto(goto)
    }

    fn green(text: &str, x0: f32, goto: ScreenId) -> Element {
        Element::new(BUTTON_GREEN, BBox::new(x0, 700.0, x0 + 160.0, 750.0))
            .text(text)
            .goto(goto)
    }

    fn white(text: &str, x0: f32, goto: ScreenId) -> Element {
        Element::new(BUTTON_WHITE, BBox::new(x0, 700.0, x0 + 160.0, 750.0))
            .text(text)
            .goto(goto)
    }

    /// Screens shared by every race scenario
    struct Course {
        game: FakeGame,
        lobby: ScreenId,
        loss: ScreenId,
        lobby_after: ScreenId,
        win: ScreenId,
    }

    /// lobby -> running -> skip -> loss; winning after the retry lobby
    fn course() -> Course {
        let mut game = FakeGame::new();
        let lobby = game.add_screen("lobby");
        let running = game.add_screen("running");
        let result = game.add_screen("result");
        let loss = game.add_screen("loss");
        let lobby_after = game.add_screen("lobby_after");
        let running_after = game.add_screen("running_after");
        let win = game.add_screen("win");
        let done = game.add_screen("done");

        game.add(lobby, review(0.1, running));
        game.add(lobby, green("Race", 220.0, running));
        game.advance_after(running, Duration::from_secs(3), result);
        game.add(
            result,
            Element::new(BUTTON_SKIP, BBox::new(300.0, 760.0, 380.0, 790.0)).goto(loss),
        );
        game.add(loss, green("Try Again", 220.0, lobby));
        game.add(loss, white("Next", 40.0, done));

        game.add(lobby_after, review(1.0, running_after));
        game.add(lobby_after, green("Race", 220.0, running_after));
        game.advance_after(running_after, Duration::from_secs(2), win);
        game.add(win, green("Next", 220.0, done));

        Course {
            game,
            lobby,
            loss,
            lobby_after,
            win,
        }
    }

    #[test]
    fn test_single_retry_with_one_confirmation() {
        let mut course = course();
        let confirm = course.game.add_screen("confirm");
        course.game.add(confirm, green("Use", 220.0, course.lobby_after));
        course.game.add(confirm, white("Cancel", 40.0, course.loss));
        course.game.retarget(course.loss, "Try Again", confirm);

        let game = &course.game;
        let kit = game.toolkit();
        let report = flow(&Settings::default())
            .run(&kit, RetrySession::default())
            .unwrap();

        assert_eq!(report.outcome, RaceOutcome::Advanced);
        assert_eq!(report.session.loss_count, 1);
        assert_eq!(report.session.retry_attempts, 1);
        assert_eq!(report.session.retry_successes, 1);
        assert_eq!(report.confirmation_clicks, 1);
        assert_eq!(game.clicks_on("Use"), 1);
        assert_eq!(game.clicks_on("Cancel"), 0);
        assert_eq!(game.clicks_on_screen("lobby_after", "Race"), 0);
        assert_eq!(game.clicks_on_screen("lobby_after", "View Results"), 1);
        assert_eq!(report.visits(RacePhase::RetryTransition), 1);
        assert_eq!(report.visits(RacePhase::Lobby), 2);
        assert_eq!(game.current_screen(), "done");
    }

    #[test]
    fn test_retry_disabled_never_clicks_try_again() {
        let course = course();
        let game = &course.game;
        let kit = game.toolkit();

        let mut settings = Settings::default();
        settings.race.retry_on_loss = false;
        let report = flow(&settings).run(&kit, RetrySession::default()).unwrap();

        assert_eq!(report.outcome, RaceOutcome::Advanced);
        assert_eq!(report.session.loss_count, 1);
        assert_eq!(report.session.retry_attempts, 0);
        assert_eq!(game.clicks_on("Try Again"), 0);
        assert_eq!(game.clicks_on_screen("loss", "Next"), 1);
        assert_eq!(report.visits(RacePhase::RetryTransition), 0);
    }

    #[test]
    fn test_retry_budget_is_respected() {
        let course = course();
        let game = &course.game;
        let kit = game.toolkit();

        let mut settings = Settings::default();
        settings.race.max_retries = 2;
        let report = flow(&settings).run(&kit, RetrySession::default()).unwrap();

        // Retrying always lands back in the losing lobby
        assert_eq!(report.session.retry_attempts, 2);
        assert_eq!(report.session.loss_count, 3);
        assert_eq!(game.clicks_on("Try Again"), 2);
        assert_eq!(game.clicks_on_screen("loss", "Next"), 1);
        assert_eq!(report.outcome, RaceOutcome::Advanced);
    }

    #[test]
    fn test_terminal_state_wins_over_confirmation() {
        let mut course = course();
        let transition = course.game.add_screen("transition");
        course.game.add(transition, green("Use", 220.0, course.lobby));
        course.game.add(transition, review(1.0, course.win));
        course.game.retarget(course.loss, "Try Again", transition);

        let game = &course.game;
        let kit = game.toolkit();
        let report = flow(&Settings::default())
            .run(&kit, RetrySession::default())
            .unwrap();

        assert_eq!(game.clicks_on("Use"), 0);
        assert_eq!(report.confirmation_clicks, 0);
        assert_eq!(report.session.retry_successes, 1);
        assert_eq!(report.outcome, RaceOutcome::Advanced);
    }

    #[test]
    fn test_retry_transition_timeout_returns_to_lobby() {
        let mut course = course();
        let loading = course.game.add_screen("loading");
        course
            .game
            .advance_after(loading, Duration::from_secs(11), course.lobby_after);
        course.game.retarget(course.loss, "Try Again", loading);

        let game = &course.game;
        let kit = game.toolkit();
        let report = flow(&Settings::default())
            .run(&kit, RetrySession::default())
            .unwrap();

        assert_eq!(report.session.retry_attempts, 1);
        assert_eq!(report.session.retry_successes, 0);
        assert_eq!(report.confirmation_clicks, 0);
        let transition = report
            .phases
            .iter()
            .position(|p| *p == RacePhase::RetryTransition)
            .unwrap();
        assert_eq!(report.phases[transition + 1], RacePhase::Lobby);
        assert_eq!(report.outcome, RaceOutcome::Advanced);
    }

    #[test]
    fn test_expired_deadline_stops_before_any_click() {
        let course = course();
        let game = &course.game;
        let kit = game.toolkit();

        let session = RetrySession::new(Some(game.now()));
        let report = flow(&Settings::default()).run(&kit, session).unwrap();

        assert_eq!(report.outcome, RaceOutcome::DeadlineExceeded);
        assert_eq!(report.phases, vec![RacePhase::Aborted]);
        assert!(game.clicks().is_empty());
    }

    #[test]
    fn test_missing_result_controls_time_out() {
        let mut game = FakeGame::new();
        let lobby = game.add_screen("lobby");
        let limbo = game.add_screen("limbo");
        game.add(lobby, review(0.0, limbo));
        game.add(lobby, green("Race", 220.0, limbo));
        let kit = game.toolkit();

        let result = flow(&Settings::default()).run(&kit, RetrySession::default());
        assert!(matches!(result, Err(FlowError::RaceStartTimeout(_))));
    }

    #[test]
    fn test_scheduled_run_selects_card_and_confirms() {
        let mut course = course();
        let list = course.game.add_screen("list");
        let dialog = course.game.add_screen("dialog");
        let list_confirm = course.game.add_screen("list_confirm");
        for (row, title) in ["Kyoto Nisai Stakes", "Hopeful Stakes"].iter().enumerate() {
            let y = 100.0 + row as f32 * 120.0;
            course.game.add(
                list,
                Element::new(RACE_CARD, BBox::new(10.0, y, 410.0, y + 100.0)).goto(list_confirm),
            );
            course.game.add(
                list,
                Element::new("text", BBox::new(160.0, y + 4.0, 405.0, y + 40.0))
                    .text(title)
                    .hidden(),
            );
        }
        course.game.add(list_confirm, green("Race", 220.0, dialog));
        course.game.add(dialog, white("Cancel", 40.0, list));
        course.game.add(dialog, green("Race", 220.0, course.lobby_after));
        course.game.start_at(list);
        course.game.retarget(course.lobby_after, "View Results", course.win);

        let game = &course.game;
        let kit = game.toolkit();
        let index = EntityIndex::new();
        let matcher = BannerMatcher::default();
        let settings = Settings::default();
        let resolver = RaceResolver::new(&index, &matcher, settings.resolver.clone());

        let report = flow(&settings)
            .run_scheduled(
                &kit,
                &resolver,
                &LobbyPlan::scheduled("Hopeful Stakes", None),
                RetrySession::default(),
            )
            .unwrap();

        assert_eq!(report.phases[0], RacePhase::SelectRace);
        assert_eq!(report.outcome, RaceOutcome::Advanced);
        assert_eq!(game.clicks_on_screen("dialog", "Race"), 1);
        assert_eq!(game.clicks_on_screen("dialog", "Cancel"), 0);
        assert_eq!(game.clicks()[0].screen, "list");
        assert_eq!(report.session.loss_count, 0);
    }

    #[test]
    fn test_scheduled_run_without_eligible_card() {
        let mut game = FakeGame::new();
        game.add_screen("empty_list");
        let kit = game.toolkit();

        let index = EntityIndex::new();
        let matcher = BannerMatcher::default();
        let settings = Settings::default();
        let resolver = RaceResolver::new(&index, &matcher, settings.resolver.clone());

        let report = flow(&settings)
            .run_scheduled(
                &kit,
                &resolver,
                &LobbyPlan::scheduled("Hopeful Stakes", None),
                RetrySession::default(),
            )
            .unwrap();
        assert_eq!(report.outcome, RaceOutcome::NoEligibleRace);
        assert_eq!(report.phases, vec![RacePhase::SelectRace, RacePhase::Aborted]);
        assert!(game.clicks().is_empty());
    }

    #[test]
    fn test_invalid_vocabulary_is_rejected() {
        let mut settings = Settings::default();
        settings.vocabulary.confirmations.push("view results".to_string());
        assert!(matches!(
            RaceFlow::new(&settings, Humanizer::default()),
            Err(FlowError::Config(_))
        ));
    }
}
