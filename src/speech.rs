//! Speech rendering via the Google Translate TTS endpoint.
//!
//! Pipeline:
//! 1. Text → chunks of at most 100 chars (sentence, then word boundaries)
//! 2. Chunk → MP3 bytes (one GET per chunk)
//! 3. Concatenated MP3 → `speech.output_path` (overwritten every turn)
//! 4. MP3 → local playback on a blocking thread

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::player::Playback;

/// Longest text the endpoint accepts in one request.
const MAX_CHUNK_CHARS: usize = 100;

/// Timing and output of one speak call.
#[derive(Debug, Clone, Default)]
pub struct SpeechReport {
    pub audio_bytes: usize,
    pub synth_ms: f64,
    pub playback_ms: f64,
    pub path: Option<PathBuf>,
}

#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<SpeechReport, SpeechError>;
}

pub struct GoogleSpeech {
    config: SpeechConfig,
    client: Client,
    player: Arc<dyn Playback>,
}

impl GoogleSpeech {
    pub fn new(config: SpeechConfig, player: Arc<dyn Playback>) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()?;

        Ok(Self {
            config,
            client,
            player,
        })
    }

    /// Fetch MP3 audio for `text`, one request per chunk.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let chunks = split_for_speech(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::NothingToSpeak);
        }

        let url = format!("{}/translate_tts", self.config.host.trim_end_matches('/'));
        let speed = if self.config.slow { "0.3" } else { "1" };
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let idx_param = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let resp = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("q", chunk.as_str()),
                    ("tl", self.config.lang.as_str()),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx_param.as_str()),
                    ("textlen", textlen.as_str()),
                    ("client", "tw-ob"),
                ])
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(SpeechError::Status(resp.status()));
            }

            let bytes = resp.bytes().await?;
            debug!("Chunk {}/{}: {} bytes", idx + 1, chunks.len(), bytes.len());
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(audio)
    }
}

#[async_trait]
impl SpeechRenderer for GoogleSpeech {
    async fn speak(&self, text: &str) -> Result<SpeechReport, SpeechError> {
        let t_synth = Instant::now();
        let audio = self.synthesize(text).await?;
        let synth_ms = t_synth.elapsed().as_secs_f64() * 1000.0;

        let path = self.config.output_path.clone();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SpeechError::Write {
                    path: path.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|source| SpeechError::Write {
                path: path.clone(),
                source,
            })?;

        let audio_bytes = audio.len();
        let t_play = Instant::now();
        let player = self.player.clone();
        tokio::task::spawn_blocking(move || player.play(audio))
            .await
            .map_err(|e| SpeechError::Playback(format!("Playback task failed: {e}")))??;
        let playback_ms = t_play.elapsed().as_secs_f64() * 1000.0;

        info!(
            "Spoke {} chars: {audio_bytes} bytes → {} (synth={synth_ms:.0}ms play={playback_ms:.0}ms)",
            text.len(),
            path.display()
        );

        Ok(SpeechReport {
            audio_bytes,
            synth_ms,
            playback_ms,
            path: Some(path),
        })
    }
}

/// Renderer used with `--no-speech`: nothing is synthesized or played.
pub struct NoSpeech;

#[async_trait]
impl SpeechRenderer for NoSpeech {
    async fn speak(&self, _text: &str) -> Result<SpeechReport, SpeechError> {
        Ok(SpeechReport::default())
    }
}

/// Split text into request-sized chunks, preferring sentence boundaries,
/// then word boundaries. Words longer than `max` are cut by characters.
fn split_for_speech(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for sentence in split_sentences(text.trim()) {
        if sentence.chars().count() <= max {
            chunks.push(sentence.to_string());
            continue;
        }

        let mut current = String::new();
        for word in sentence.split_whitespace() {
            for piece in hard_split(word, max) {
                let len = current.chars().count();
                if len > 0 && len + 1 + piece.chars().count() > max {
                    chunks.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(piece);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
    }

    chunks
}

fn hard_split(word: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = word;
    while rest.chars().count() > max {
        let cut = rest.char_indices().nth(max).map_or(rest.len(), |(i, _)| i);
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Sentences end at `.`, `!` or `?` followed by whitespace, so "v1.2" and
/// "e.g." mid-token stay whole. Pieces are trimmed; empty ones are dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut chars = text.char_indices().peekable();
    let mut bounds = vec![0];
    while let Some((i, c)) = chars.next() {
        let at_end = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|&(_, next)| next.is_whitespace());
        if at_end {
            bounds.push(i + c.len_utf8());
        }
    }
    bounds.push(text.len());

    bounds
        .windows(2)
        .map(|w| text[w[0]..w[1]].trim())
        .filter(|s| !s.is_empty())
        .collect()
}
