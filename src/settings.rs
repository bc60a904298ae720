use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SETTINGS_DIR_NAME: &str = "swapers";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Write settings {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything Swapers says out loud, with `{name}` / `{n}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpokenLines {
    /// Greeting; `{name}` is replaced with the candidate's display name.
    pub greeting: String,
    /// Spoken before each question; `{n}` is the 1-based question number.
    pub question_prefix: String,
    pub closing: String,
    /// Re-prompt when an answer is too short to send for validation.
    pub repeat_short_answer: String,
    /// Re-prompt after the recognizer reported no speech or failed.
    pub repeat_no_speech: String,
    /// Spoken when the validator is unavailable and the answer is accepted as-is.
    pub validator_unavailable: String,
    /// Acknowledgement used by the offline validator.
    pub accepted: String,
    /// Rejection used by the offline validator.
    pub rejected: String,
}

impl Default for SpokenLines {
    fn default() -> Self {
        Self {
            greeting: "Halo {name}, saya Swapers. Agen AI yang akan mewawancarai Anda hari ini. \
                       Pastikan Anda di ruangan yang tenang. Kita mulai ya?"
                .to_string(),
            question_prefix: "Pertanyaan nomor {n}.".to_string(),
            closing: "Terima kasih. Sesi wawancara telah selesai. Kami akan menganalisis jawaban \
                      Anda dan menghubungi segera."
                .to_string(),
            repeat_short_answer: "Jawaban Anda terlalu singkat. Mohon ulangi jawaban Anda."
                .to_string(),
            repeat_no_speech: "Maaf, saya tidak mendengar suara Anda. Mohon ulangi jawaban Anda."
                .to_string(),
            validator_unavailable: "Baik, mari lanjut.".to_string(),
            accepted: "Baik, jawaban diterima.".to_string(),
            rejected: "Maaf suara kurang jelas, bisa ulangi?".to_string(),
        }
    }
}

impl SpokenLines {
    pub fn greeting_for(&self, name: &str) -> String {
        self.greeting.replace("{name}", name)
    }

    /// Full prompt for question `index` (0-based).
    pub fn question_line(&self, index: usize, question: &str) -> String {
        let prefix = self.question_prefix.replace("{n}", &(index + 1).to_string());
        format!("{} {}", prefix.trim(), question.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewSettings {
    /// BCP-47 tag used for both recognition and synthesis.
    pub language: String,

    pub speech_rate: f32,
    pub speech_pitch: f32,

    /// Answers shorter than this (in characters, trimmed) are re-prompted
    /// locally and never sent to the validator.
    pub min_answer_chars: usize,

    /// Consecutive recognizer restarts without any speech before the
    /// listener reports an engine fault.
    pub max_listener_restarts: u32,

    /// Consecutive recognizer failures (with no speech in between) before
    /// the session gives up on the unsupported screen.
    pub max_engine_faults: u32,

    pub validator_model: String,

    /// Validation calls running longer than this fail open.
    pub validator_timeout_secs: u64,

    /// Language the validator should phrase its feedback in.
    pub feedback_language: String,

    /// Minimum word count for the offline validator.
    pub heuristic_min_words: usize,

    pub lines: SpokenLines,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            language: "id-ID".to_string(),
            speech_rate: 1.0,
            speech_pitch: 1.0,
            min_answer_chars: 5,
            max_listener_restarts: 20,
            max_engine_faults: 3,
            validator_model: "gemini-2.5-flash".to_string(),
            validator_timeout_secs: 20,
            feedback_language: "Indonesian".to_string(),
            heuristic_min_words: 3,
            lines: SpokenLines::default(),
        }
    }
}

/// `<config dir>/swapers/settings.json`
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Load settings from `path`. A missing file yields defaults.
pub fn load_settings(path: &Path) -> Result<InterviewSettings, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_json::from_str::<InterviewSettings>(&contents).map_err(|source| {
                SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Settings: {:?} not found, using defaults", path);
            Ok(InterviewSettings::default())
        }
        Err(source) => Err(SettingsError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Load settings, logging and falling back to defaults on any error.
pub fn load_settings_or_default(path: &Path) -> InterviewSettings {
    load_settings(path).unwrap_or_else(|e| {
        log::warn!("Settings: {}", e);
        InterviewSettings::default()
    })
}

pub fn save_settings(path: &Path, settings: &InterviewSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let contents = serde_json::to_string_pretty(settings)?;

    // Write to a temp file in the same directory, then rename over the target.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents).map_err(|source| SettingsError::Write {
        path: tmp_path.clone(),
        source,
    })?;

    // rename() does not replace an existing file on Windows.
    if cfg!(windows) && path.exists() {
        if let Err(source) = std::fs::remove_file(path) {
            if source.kind() != std::io::ErrorKind::NotFound {
                return Err(SettingsError::Write {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }

    std::fs::rename(&tmp_path, path).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.language, "id-ID");
        assert_eq!(settings.min_answer_chars, 5);
        assert_eq!(settings.max_engine_faults, 3);
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);

        let mut settings = InterviewSettings::default();
        settings.language = "en-US".to_string();
        settings.lines.closing = "Thanks!".to_string();
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.language, "en-US");
        assert_eq!(loaded.lines.closing, "Thanks!");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"min_answer_chars": 12, "lines": {"closing": "Selesai."}}"#)
            .unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded.min_answer_chars, 12);
        assert_eq!(loaded.lines.closing, "Selesai.");
        assert_eq!(loaded.lines.question_prefix, "Pertanyaan nomor {n}.");
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_settings(&path), Err(SettingsError::Parse { .. })));
        assert_eq!(load_settings_or_default(&path).language, "id-ID");
    }

    #[test]
    fn lines_fill_placeholders() {
        let lines = SpokenLines::default();
        assert!(lines.greeting_for("Budi").starts_with("Halo Budi,"));
        assert_eq!(
            lines.question_line(1, "Mengapa Anda tertarik?"),
            "Pertanyaan nomor 2. Mengapa Anda tertarik?"
        );
    }
}
