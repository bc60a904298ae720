use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use swapers_lib::console::{ConsoleMedia, ConsoleNarrator, ConsoleTranscriber};
use swapers_lib::settings::{default_settings_path, load_settings_or_default};
use swapers_lib::validation::{
    is_api_key_configured, AnswerValidator, GeminiValidator, HeuristicValidator,
};
use swapers_lib::{Capabilities, InterviewSession, InterviewSettings, SessionInput, UiState};

const DEFAULT_QUESTIONS: &[&str] = &[
    "Ceritakan tentang diri Anda dan pengalaman kerja Anda.",
    "Mengapa Anda tertarik dengan posisi ini?",
    "Apa kelebihan dan kekurangan Anda?",
];

const NARRATION_PAUSE: Duration = Duration::from_millis(400);

/// Run a Swapers interview in the terminal.
#[derive(Parser, Debug)]
#[command(name = "swapers", version, about)]
struct Args {
    /// Candidate display name
    #[arg(long, default_value = "")]
    name: String,

    /// File with one question per line, or a JSON array of strings
    #[arg(long)]
    questions: Option<PathBuf>,

    /// Settings file (defaults to <config dir>/swapers/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Validate answers locally instead of calling Gemini
    #[arg(long)]
    offline: bool,
}

fn load_questions(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e));
    }
    Ok(contents.lines().map(str::to_string).collect())
}

fn pick_validator(args: &Args, settings: &InterviewSettings) -> Arc<dyn AnswerValidator> {
    let offline = || {
        Arc::new(HeuristicValidator::new(
            settings.heuristic_min_words,
            &settings.lines.accepted,
            &settings.lines.rejected,
        )) as Arc<dyn AnswerValidator>
    };

    if args.offline {
        return offline();
    }
    if !is_api_key_configured() {
        log::warn!("GEMINI_API_KEY not set, using offline validator");
        return offline();
    }
    match GeminiValidator::from_env(&settings.validator_model, &settings.feedback_language) {
        Ok(validator) => Arc::new(validator),
        Err(e) => {
            log::warn!("Gemini validator unavailable ({}), using offline validator", e);
            offline()
        }
    }
}

fn print_ui(ui: &UiState) {
    match ui {
        UiState::Listening { index, total, .. } => {
            println!(
                "[{}/{}] Ketik jawaban Anda, lalu /done (/mute, /unmute, /camera on|off, /exit)",
                index + 1,
                total
            );
        }
        UiState::Processing { .. } => println!("[menganalisis jawaban...]"),
        UiState::Unsupported { message } => eprintln!("Kamera/mikrofon tidak tersedia: {}", message),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => load_settings_or_default(path),
        None => match default_settings_path() {
            Ok(path) => load_settings_or_default(&path),
            Err(e) => {
                log::warn!("Settings: {}", e);
                InterviewSettings::default()
            }
        },
    };

    let questions = match &args.questions {
        Some(path) => match load_questions(path) {
            Ok(questions) => questions,
            Err(e) => {
                eprintln!("Failed to read questions from {:?}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect(),
    };

    let transcriber = Arc::new(ConsoleTranscriber::new());
    let capabilities = Capabilities {
        media: Arc::new(ConsoleMedia::new()),
        transcriber: transcriber.clone(),
        narrator: Arc::new(ConsoleNarrator::new(NARRATION_PAUSE)),
        validator: pick_validator(&args, &settings),
    };

    let session = InterviewSession::create(
        SessionInput::new(&args.name, questions),
        &settings,
        capabilities,
        |report| {
            log::info!(
                "Report ready: {} answer(s), outcome {}, {}s",
                report.transcript.len(),
                report.outcome.as_str(),
                report.duration().num_seconds()
            );
        },
    );

    let mut ui = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = ui.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = ui.borrow_and_update().clone();
                print_ui(&state);
                if matches!(state, UiState::Completed { .. } | UiState::Unsupported { .. }) {
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        session.exit().await;
                        break;
                    }
                };

                let result = match line.trim() {
                    "" => Ok(()),
                    "/done" => session.done_speaking().await,
                    "/mute" => session.set_microphone(false).await,
                    "/unmute" => session.set_microphone(true).await,
                    "/camera on" => session.set_camera(true).await,
                    "/camera off" => session.set_camera(false).await,
                    "/exit" => {
                        session.exit().await;
                        Ok(())
                    }
                    text => {
                        if !transcriber.feed(text) {
                            println!("(Swapers belum mendengarkan)");
                        }
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    log::debug!("Command ignored: {}", e);
                }
            }
        }
    }

    match session.join().await {
        Some(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize report: {}", e);
                ExitCode::FAILURE
            }
        },
        None => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_from_lines_or_json() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("questions.txt");
        std::fs::write(&plain, "Q1\n\nQ2\n").unwrap();
        assert_eq!(load_questions(&plain).unwrap(), vec!["Q1", "", "Q2"]);

        let json = dir.path().join("questions.json");
        std::fs::write(&json, r#"["Q1", "Q2"]"#).unwrap();
        assert_eq!(load_questions(&json).unwrap(), vec!["Q1", "Q2"]);

        std::fs::write(&json, "[not json").unwrap();
        assert!(load_questions(&json).is_err());
    }
}
