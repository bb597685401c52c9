use clap::ValueEnum;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_STORED_WARNINGS: usize = 32;

/// Advisory counters emitted after each directory the scanner finishes.
#[derive(Debug, Clone, Copy)]
pub struct ScanSnapshot {
    pub folders_scanned: u64,
    pub files_found: u64,
    pub elapsed: Duration,
}

/// Where pipeline progress goes. The CLI reporter implements this; headless
/// callers can pass [`NoopSink`]. Updates are advisory and must stay cheap:
/// the scanner never waits on a sink.
pub trait ProgressSink: Send + Sync {
    fn scan_update(&self, snapshot: &ScanSnapshot);
    fn frame_done(&self, done: u64, total: u64);
    fn warn(&self, message: &str);
    fn stage(&self, _name: &str) {}
}

/// Sink that drops everything, for batch/embedded use.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn scan_update(&self, _snapshot: &ScanSnapshot) {}
    fn frame_done(&self, _done: u64, _total: u64) {}
    fn warn(&self, _message: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    pub plain_interval: Duration,
    tty_override: Option<bool>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            mode: ProgressMode::Auto,
            plain_interval: Duration::from_secs(2),
            tty_override: None,
        }
    }
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_tty_override(mut self, is_tty: bool) -> Self {
        self.tty_override = Some(is_tty);
        self
    }

    pub fn resolve_mode(self) -> ResolvedProgressMode {
        self.mode.resolve(
            self.tty_override
                .unwrap_or_else(|| std::io::stderr().is_terminal()),
        )
    }
}

impl ProgressMode {
    fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

/// What the reporter hands back once the run is over, for the final summary.
#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub elapsed: Duration,
    pub warning_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

/// TTY-aware reporter: rich indicatif bars on a terminal, periodic stderr
/// lines otherwise, nothing in quiet mode. A background ticker keeps the
/// elapsed display moving even when the pipeline is stuck in a long decode.
pub struct ProgressReporter {
    handle: ProgressHandle,
    ticker: Option<JoinHandle<()>>,
}

struct ProgressInner {
    label: String,
    mode: ResolvedProgressMode,
    plain_interval: Duration,
    state: Mutex<ProgressState>,
    rich: Option<RichUi>,
    stop: AtomicBool,
    finalized: AtomicBool,
}

struct RichUi {
    _multi: MultiProgress,
    overall: ProgressBar,
    stage: ProgressBar,
}

#[derive(Debug)]
struct ProgressState {
    started: Instant,
    stage: String,
    folders_scanned: u64,
    files_found: u64,
    frames_done: u64,
    frames_total: u64,
    last_plain_emit: Instant,
    warnings: Vec<String>,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, config: ProgressConfig) -> Self {
        let label = label.into();
        let mode = config.resolve_mode();
        let now = Instant::now();

        let rich = if mode == ResolvedProgressMode::Rich {
            Some(RichUi::new(&label))
        } else {
            None
        };

        let inner = Arc::new(ProgressInner {
            label,
            mode,
            plain_interval: config.plain_interval,
            state: Mutex::new(ProgressState {
                started: now,
                stage: "starting".to_string(),
                folders_scanned: 0,
                files_found: 0,
                frames_done: 0,
                frames_total: 0,
                last_plain_emit: now.checked_sub(config.plain_interval).unwrap_or(now),
                warnings: Vec::new(),
            }),
            rich,
            stop: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        });

        let ticker_inner = Arc::clone(&inner);
        let ticker = thread::spawn(move || {
            while !ticker_inner.stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(500));
                ticker_inner.render_current(false);
            }
        });

        let handle = ProgressHandle { inner };
        Self {
            handle,
            ticker: Some(ticker),
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(mut self, final_message: impl Into<String>) -> ProgressOutcome {
        self.shutdown_ticker();
        self.handle.inner.finalize(Some(final_message.into()))
    }

    fn shutdown_ticker(&mut self) {
        self.handle.inner.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.ticker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown_ticker();
        let _ = self.handle.inner.finalize(None);
    }
}

impl ProgressHandle {
    pub fn set_stage(&self, stage: impl Into<String>) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.stage = stage.into();
        }
        self.inner.render_current(true);
    }

}

impl ProgressSink for ProgressHandle {
    fn scan_update(&self, snapshot: &ScanSnapshot) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.folders_scanned = snapshot.folders_scanned;
            state.files_found = snapshot.files_found;
        }
        self.inner.render_current(false);
    }

    fn frame_done(&self, done: u64, total: u64) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.frames_done = done;
            state.frames_total = total;
        }
        if let Some(rich) = &self.inner.rich {
            rich.overall.set_length(total.max(1));
            rich.overall.set_position(done.min(total));
        }
        self.inner.render_current(false);
    }

    fn warn(&self, message: &str) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.warnings.len() >= MAX_STORED_WARNINGS {
                state.warnings.remove(0);
            }
            state.warnings.push(message.to_string());
        }
        self.inner.emit_message("WARN", message);
    }

    fn stage(&self, name: &str) {
        self.set_stage(name);
    }
}

impl ProgressInner {
    fn render_current(&self, force_plain: bool) {
        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Rich => self.render_rich(),
            ResolvedProgressMode::Plain => {
                let due = {
                    let mut state = self.state.lock().unwrap();
                    let now = Instant::now();
                    let due = force_plain
                        || now.duration_since(state.last_plain_emit) >= self.plain_interval;
                    if due {
                        state.last_plain_emit = now;
                    }
                    due
                };
                if due {
                    self.render_plain();
                }
            }
        }
    }

    fn render_rich(&self) {
        let Some(rich) = &self.rich else {
            return;
        };
        let (line, stage) = {
            let state = self.state.lock().unwrap();
            (status_line(&state), state.stage.clone())
        };
        rich.overall.set_message(line);
        rich.stage.set_message(stage);
        rich.stage.tick();
    }

    fn render_plain(&self) {
        let line = {
            let state = self.state.lock().unwrap();
            format!(
                "[PROGRESS] {} stage={} {}",
                self.label,
                state.stage,
                status_line(&state)
            )
        };
        eprintln!("{line}");
    }

    fn emit_message(&self, level: &str, message: &str) {
        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => {
                eprintln!("[{}] {}: {}", level, self.label, message);
            }
            ResolvedProgressMode::Rich => {
                if let Some(rich) = &self.rich {
                    rich.stage
                        .println(format!("[{}] {}: {}", level, self.label, message));
                } else {
                    eprintln!("[{}] {}: {}", level, self.label, message);
                }
            }
        }
    }

    fn finalize(&self, final_message: Option<String>) -> ProgressOutcome {
        if self.finalized.swap(true, Ordering::Relaxed) {
            return self.current_outcome();
        }

        match self.mode {
            ResolvedProgressMode::Quiet => {}
            ResolvedProgressMode::Plain => {
                self.render_plain();
                if let Some(msg) = final_message.as_deref() {
                    eprintln!("[DONE] {}: {}", self.label, msg);
                }
            }
            ResolvedProgressMode::Rich => {
                if let Some(rich) = &self.rich {
                    let line = {
                        let state = self.state.lock().unwrap();
                        status_line(&state)
                    };
                    rich.overall.finish_with_message(line);
                    if let Some(msg) = final_message {
                        rich.stage.finish_with_message(msg);
                    } else {
                        rich.stage.finish_and_clear();
                    }
                }
            }
        }

        self.current_outcome()
    }

    fn current_outcome(&self) -> ProgressOutcome {
        let state = self.state.lock().unwrap();
        ProgressOutcome {
            elapsed: state.started.elapsed(),
            warning_count: state.warnings.len(),
            warnings: state.warnings.clone(),
        }
    }
}

impl RichUi {
    fn new(label: &str) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(1));
        let stage = multi.add(ProgressBar::new_spinner());

        overall.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} frames | {msg}",
            )
            .expect("valid progress template"),
        );
        overall.set_message(format!("{label} starting"));

        stage.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .expect("valid stage template")
                .tick_chars("|/-\\ "),
        );
        stage.enable_steady_tick(Duration::from_millis(120));
        stage.set_message("starting");

        Self {
            _multi: multi,
            overall,
            stage,
        }
    }
}

fn status_line(state: &ProgressState) -> String {
    format!(
        "folders={} images={} frames={}/{} elapsed={:.2}s",
        state.folders_scanned,
        state.files_found,
        state.frames_done,
        state.frames_total,
        state.started.elapsed().as_secs_f64()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution_respects_tty_override() {
        let cfg_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(true);
        assert_eq!(cfg_tty.resolve_mode(), ResolvedProgressMode::Rich);

        let cfg_not_tty = ProgressConfig::new(ProgressMode::Auto).with_tty_override(false);
        assert_eq!(cfg_not_tty.resolve_mode(), ResolvedProgressMode::Plain);

        let cfg_quiet = ProgressConfig::new(ProgressMode::Quiet).with_tty_override(true);
        assert_eq!(cfg_quiet.resolve_mode(), ResolvedProgressMode::Quiet);
    }

    #[test]
    fn warnings_are_capped() {
        let reporter = ProgressReporter::new("test", ProgressConfig::new(ProgressMode::Quiet));
        let handle = reporter.handle();
        for i in 0..(MAX_STORED_WARNINGS + 10) {
            handle.warn(&format!("warning {i}"));
        }
        let outcome = reporter.finish("done");
        assert_eq!(outcome.warning_count, MAX_STORED_WARNINGS);
        // Oldest entries are evicted first.
        assert_eq!(outcome.warnings[0], "warning 10");
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let sink = NoopSink;
        sink.scan_update(&ScanSnapshot {
            folders_scanned: 3,
            files_found: 7,
            elapsed: Duration::from_secs(1),
        });
        sink.frame_done(1, 4);
        sink.warn("ignored");
    }
}
