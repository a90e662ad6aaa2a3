//! Uma Pilot CLI - inspection entry point
//!
//! Loads settings, the race index and banner templates the way a run would,
//! prints what was loaded, and can explain how an OCR reading scores
//! against a race's expected titles.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use uma_pilot::config::Settings;
use uma_pilot::game::{canonicalize, EntityIndex};
use uma_pilot::vision::text::title_score;
use uma_pilot::Pilot;

/// Built-in settings presets
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// No retries, stricter race acceptance
    Conservative,
    /// Retries on, global race-list scan
    Farming,
}

#[derive(Debug, Parser)]
#[command(name = "pilot")]
#[command(
    about = "Inspect race-flow settings, the race index and banner templates",
    long_about = None
)]
struct Args {
    /// Settings JSON file (takes precedence over --preset)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Built-in settings preset
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Race index JSON file
    #[arg(long)]
    index: Option<PathBuf>,

    /// Directory of banner template images
    #[arg(long)]
    banners: Option<PathBuf>,

    /// Score an OCR reading against a race's titles: OCR RACE [DATE]
    #[arg(long, num_args = 2..=3, value_names = ["OCR", "RACE", "DATE"])]
    explain_title: Option<Vec<String>>,
}

fn load_settings(args: &Args) -> Result<Settings, String> {
    match (&args.settings, args.preset) {
        (Some(path), _) => Settings::load(path).map_err(|e| e.to_string()),
        (None, Some(Preset::Conservative)) => Ok(Settings::conservative_preset()),
        (None, Some(Preset::Farming)) => Ok(Settings::farming_preset()),
        (None, None) => Ok(Settings::default()),
    }
}

fn run(args: Args) -> Result<(), String> {
    let settings = load_settings(&args)?;
    let index = match &args.index {
        Some(path) => EntityIndex::from_path(path).map_err(|e| e.to_string())?,
        None => EntityIndex::new(),
    };

    let mut pilot = Pilot::new(settings, index);
    let banners = match &args.banners {
        Some(dir) => pilot.load_banners(dir).map_err(|e| e.to_string())?,
        None => 0,
    };

    println!("Uma Pilot - race flow decision core");
    println!("===================================");
    println!();
    println!("Loaded:");
    println!("  - Races in index: {}", pilot.index.len());
    println!("  - Banner templates: {}", banners);
    println!();

    let settings = &pilot.settings;
    println!("Current Configuration:");
    println!("  - Min Text Score: {}", settings.selector.min_text_score);
    println!("  - Forbidden Veto: {}", settings.selector.veto_threshold);
    println!("  - Accept Threshold: {}", settings.resolver.accept_threshold);
    println!("  - Scan Mode: {:?}", settings.resolver.scan_mode);
    println!(
        "  - Retry On Loss: {} (max {})",
        settings.race.retry_on_loss, settings.race.max_retries
    );
    println!("  - Lobby Active Threshold: {}", settings.lobby.active_threshold);
    println!();
    println!("Vocabulary:");
    println!("  - Try Again: {:?}", settings.vocabulary.try_again);
    println!("  - Advance: {:?}", settings.vocabulary.advance);
    println!("  - Confirmations: {:?}", settings.vocabulary.confirmations);
    println!("  - Lobby Review: {:?}", settings.vocabulary.terminal_review);
    println!("  - Lobby Action: {:?}", settings.vocabulary.terminal_action);

    if let Some([ocr, race, rest @ ..]) = args.explain_title.as_deref() {
        let date = rest.first().map(String::as_str);
        let titles = pilot.index.expected_titles(race, date);
        println!();
        println!("Title scores for '{}':", ocr);
        if titles.is_empty() {
            println!("  (no titles known for '{}')", race);
        }
        for title in &titles {
            println!("  - {:.3}  {}", title_score(ocr, title), title);
        }
        if let Some(grade) = pilot.index.expected_grade(race, date) {
            println!("  Expected grade: {:?}", grade);
        }
        let key = canonicalize(race);
        let lookalikes: Vec<String> = pilot
            .index
            .ambiguity_group(race)
            .into_iter()
            .filter(|k| *k != key)
            .collect();
        if !lookalikes.is_empty() {
            println!("  Lookalikes: {:?}", lookalikes);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
