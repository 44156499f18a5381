//! Interactive conversation loop.
//!
//! AWAITING_INPUT → TERMINATED
//!
//! Each line read is one turn: lookup → prompt → completion → speech. Turns
//! run strictly one after another; a failed turn is reported and the loop
//! keeps going.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::catalog::ProductCatalog;
use crate::completion::CompletionClient;
use crate::config::SessionConfig;
use crate::error::TurnError;
use crate::history::{TurnHistory, TurnRecord};
use crate::prompt::product_prompt;
use crate::speech::SpeechRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingInput => write!(f, "AWAITING_INPUT"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    NotFound,
    Spoken,
    Failed,
}

/// Counts of turn outcomes over a whole session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: usize,
    pub spoken: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl SessionSummary {
    fn record(&mut self, outcome: &TurnOutcome) {
        self.turns += 1;
        match outcome {
            TurnOutcome::NotFound => self.not_found += 1,
            TurnOutcome::Spoken => self.spoken += 1,
            TurnOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct ConversationSession {
    catalog: Arc<ProductCatalog>,
    completer: Arc<dyn CompletionClient>,
    speaker: Arc<dyn SpeechRenderer>,
    history: Option<TurnHistory>,
    config: SessionConfig,
    state: SessionState,
}

impl ConversationSession {
    pub fn new(
        catalog: Arc<ProductCatalog>,
        completer: Arc<dyn CompletionClient>,
        speaker: Arc<dyn SpeechRenderer>,
        history: Option<TurnHistory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            catalog,
            completer,
            speaker,
            history,
            config,
            state: SessionState::AwaitingInput,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read product IDs from `input` until the exit keyword or end of input.
    pub async fn run<R, W>(&mut self, mut input: R, mut output: W) -> std::io::Result<SessionSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut summary = SessionSummary::default();
        let mut buf = Vec::new();
        let exit_keyword = self.config.exit_keyword.to_lowercase();

        info!("Session ready with {} products", self.catalog.len());

        while self.state == SessionState::AwaitingInput {
            output.write_all(self.config.prompt.as_bytes()).await?;
            output.flush().await?;

            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                output.write_all(b"\n").await?;
                info!("Input closed");
                self.terminate();
                break;
            }

            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!("Ignoring {} bytes of input that are not UTF-8", buf.len());
                output.write_all(b"Input was not valid UTF-8\n").await?;
                continue;
            };
            let id = line.trim_end_matches(['\r', '\n']);
            if id.to_lowercase() == exit_keyword {
                output.write_all(b"Exiting the conversation.\n").await?;
                self.terminate();
                break;
            }
            if id.trim().is_empty() {
                continue;
            }

            let outcome = self.run_turn(id, &mut output).await?;
            summary.record(&outcome);
        }

        output.flush().await?;
        info!(
            "Session ended: {} turns ({} spoken, {} not found, {} failed)",
            summary.turns, summary.spoken, summary.not_found, summary.failed
        );
        Ok(summary)
    }

    fn terminate(&mut self) {
        info!("State: {} → {}", self.state, SessionState::Terminated);
        self.state = SessionState::Terminated;
    }

    /// One turn. Only console write errors escape; API failures become
    /// `TurnOutcome::Failed`.
    async fn run_turn<W>(&self, id: &str, output: &mut W) -> std::io::Result<TurnOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let t_turn = Instant::now();

        let Some(product) = self.catalog.lookup(id) else {
            output.write_all(b"Product not found\n").await?;
            info!("Product {id} not found");
            self.save(&TurnRecord::new(id, "not_found"));
            return Ok(TurnOutcome::NotFound);
        };

        let prompt = product_prompt(&product);
        let mut record = TurnRecord::new(id, "spoken");
        record.product_name = Some(product.product_name);
        record.prompt_chars = prompt.len();

        let completion = match self.completer.complete(&prompt).await {
            Ok(c) => c,
            Err(e) => return self.fail(record, e.into(), t_turn, output).await,
        };
        record.completion_latency_ms = Some(completion.latency_ms as i64);

        let reply = completion.text.trim().to_string();
        output
            .write_all(format!("LLM Response Latency: {:.2} ms\n", completion.latency_ms).as_bytes())
            .await?;
        output
            .write_all(format!("AI Response: {reply}\n").as_bytes())
            .await?;
        output.flush().await?;
        record.reply = Some(reply.clone());

        match self.speaker.speak(&reply).await {
            Ok(report) => {
                if let Some(path) = &report.path {
                    debug!("Saved {} bytes of audio to {}", report.audio_bytes, path.display());
                }
                record.speech_latency_ms = Some((report.synth_ms + report.playback_ms) as i64);
            }
            Err(e) => return self.fail(record, e.into(), t_turn, output).await,
        }

        record.total_latency_ms = t_turn.elapsed().as_millis() as i64;
        self.save(&record);
        Ok(TurnOutcome::Spoken)
    }

    async fn fail<W>(
        &self,
        mut record: TurnRecord,
        error: TurnError,
        t_turn: Instant,
        output: &mut W,
    ) -> std::io::Result<TurnOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        warn!("Turn for {} failed: {error}", record.product_id);
        output
            .write_all(format!("Turn failed: {error}\n").as_bytes())
            .await?;

        record.outcome = "failed".into();
        record.error = Some(error.to_string());
        record.total_latency_ms = t_turn.elapsed().as_millis() as i64;
        self.save(&record);
        Ok(TurnOutcome::Failed)
    }

    fn save(&self, record: &TurnRecord) {
        if let Some(history) = &self.history {
            history.save(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::widget_catalog;
    use crate::completion::Completion;
    use crate::error::{CompletionError, SpeechError};
    use crate::speech::SpeechReport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PROMPT: &str = "Please enter the Product ID (or type 'exit' to quit): ";

    struct MockCompleter {
        reply: Option<String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl MockCompleter {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompleter {
        async fn complete(&self, prompt: &str) -> Result<Completion, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Some(text) => Ok(Completion {
                    text: text.clone(),
                    latency_ms: 12.5,
                }),
                None => Err(CompletionError::NoChoices),
            }
        }
    }

    #[derive(Default)]
    struct MockSpeaker {
        fail: bool,
        calls: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechRenderer for MockSpeaker {
        async fn speak(&self, text: &str) -> Result<SpeechReport, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(SpeechError::EmptyAudio)
            } else {
                Ok(SpeechReport::default())
            }
        }
    }

    fn session(
        completer: Arc<MockCompleter>,
        speaker: Arc<MockSpeaker>,
        history: Option<TurnHistory>,
    ) -> ConversationSession {
        ConversationSession::new(
            Arc::new(widget_catalog()),
            completer,
            speaker,
            history,
            SessionConfig::default(),
        )
    }

    async fn drive(session: &mut ConversationSession, input: &str) -> (SessionSummary, String) {
        let mut output = Vec::new();
        let summary = session.run(input.as_bytes(), &mut output).await.unwrap();
        (summary, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn exit_keyword_in_any_case_terminates() {
        for keyword in ["exit", "EXIT", "Exit", "eXiT\r"] {
            let completer = MockCompleter::replying("unused");
            let mut session = session(completer.clone(), Arc::default(), None);

            let (summary, output) = drive(&mut session, &format!("{keyword}\nP1\n")).await;

            assert_eq!(session.state(), SessionState::Terminated);
            assert_eq!(summary, SessionSummary::default());
            assert_eq!(output, format!("{PROMPT}Exiting the conversation.\n"));
            assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn unknown_id_skips_network_calls() {
        let completer = MockCompleter::replying("unused");
        let speaker = Arc::new(MockSpeaker::default());
        let mut session = session(completer.clone(), speaker.clone(), None);

        let (summary, output) = drive(&mut session, "P404\np1\nexit\n").await;

        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.turns, 2);
        assert_eq!(output.matches("Product not found\n").count(), 2);
        assert_eq!(output.matches(PROMPT).count(), 3);
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(speaker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn found_product_is_summarized_printed_and_spoken_once() {
        let completer = MockCompleter::replying("  A fine widget at a fine price.\n");
        let speaker = Arc::new(MockSpeaker::default());
        let mut session = session(completer.clone(), speaker.clone(), None);

        let (summary, output) = drive(&mut session, "P1\nexit\n").await;

        assert_eq!(
            summary,
            SessionSummary {
                turns: 1,
                spoken: 1,
                not_found: 0,
                failed: 0
            }
        );

        assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
        let prompts = completer.prompts.lock().unwrap();
        for value in ["Widget", "A small widget", "[]", "Acme", "9.99", "7.99"] {
            assert!(prompts[0].contains(value), "prompt is missing {value}");
        }

        assert_eq!(
            *speaker.texts.lock().unwrap(),
            ["A fine widget at a fine price."]
        );
        assert_eq!(
            output
                .matches("AI Response: A fine widget at a fine price.\n")
                .count(),
            1
        );
        assert!(output.contains("LLM Response Latency: 12.50 ms\n"));
        assert!(output.ends_with("Exiting the conversation.\n"));
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn completion_failure_is_reported_and_loop_continues() {
        let completer = MockCompleter::failing();
        let speaker = Arc::new(MockSpeaker::default());
        let mut session = session(completer.clone(), speaker.clone(), None);

        let (summary, output) = drive(&mut session, "P1\nP1\nexit\n").await;

        assert_eq!(summary.failed, 2);
        assert_eq!(completer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(speaker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            output.matches("Turn failed: completion response contained no choices\n").count(),
            2
        );
        assert!(!output.contains("AI Response"));
        assert!(output.ends_with("Exiting the conversation.\n"));
    }

    #[tokio::test]
    async fn speech_failure_keeps_printed_reply() {
        let speaker = Arc::new(MockSpeaker {
            fail: true,
            ..MockSpeaker::default()
        });
        let mut session = session(MockCompleter::replying("Buy it."), speaker.clone(), None);

        let (summary, output) = drive(&mut session, "P1\nexit\n").await;

        assert_eq!(summary.failed, 1);
        assert_eq!(speaker.calls.load(Ordering::SeqCst), 1);
        assert!(output.contains("AI Response: Buy it.\n"));
        assert!(output.contains("Turn failed: speech endpoint returned no audio\n"));
    }

    #[tokio::test]
    async fn non_utf8_line_is_reported_and_loop_continues() {
        let completer = MockCompleter::replying("Sturdy and cheap.");
        let speaker = Arc::new(MockSpeaker::default());
        let mut session = session(completer.clone(), speaker.clone(), None);

        let mut output = Vec::new();
        let summary = session
            .run(&b"\xff\xfe\nP1\nexit\n"[..], &mut output)
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();

        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(
            summary,
            SessionSummary {
                turns: 1,
                spoken: 1,
                not_found: 0,
                failed: 0
            }
        );
        assert_eq!(output.matches("Input was not valid UTF-8\n").count(), 1);
        assert!(output.contains("AI Response: Sturdy and cheap.\n"));
        assert!(output.ends_with("Exiting the conversation.\n"));
        assert_eq!(speaker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_of_input_terminates_and_blank_lines_reprompt() {
        let completer = MockCompleter::replying("ok");
        let mut session = session(completer.clone(), Arc::default(), None);

        let (summary, output) = drive(&mut session, "\n   \nP1\n").await;

        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(summary.turns, 1);
        assert_eq!(output.matches(PROMPT).count(), 4);
        assert!(!output.contains("Product not found"));
        assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn turns_are_recorded_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = TurnHistory::new(dir.path().to_path_buf());
        let mut session = session(
            MockCompleter::replying("Great widget."),
            Arc::default(),
            Some(history),
        );

        drive(&mut session, "nope\nP1\nexit\n").await;

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let records = TurnHistory::new(dir.path().to_path_buf()).load(&today);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, "not_found");
        assert_eq!(records[1].outcome, "spoken");
        assert_eq!(records[1].product_name.as_deref(), Some("Widget"));
        assert_eq!(records[1].reply.as_deref(), Some("Great widget."));
        assert_eq!(records[1].completion_latency_ms, Some(12));
    }
}
