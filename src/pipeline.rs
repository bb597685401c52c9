use crate::config::{Container, ConvertConfig, Resolution, FRAMES_PER_SECOND};
use crate::encoder::VideoEncoder;
use crate::frame;
use crate::progress::ProgressSink;
use crate::scan::{self, ImageRecord, ScanOutcome};
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Cooperative abort signal, checked between frames and before the encoder
/// is spawned. Cloneable so a caller can keep one end and cancel from
/// another thread.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Terminal result of a run. Fatal conditions (bad config, encoder failure)
/// travel as `Err`; these are the ordinary endings.
#[derive(Debug)]
pub enum ConversionOutcome {
    Completed {
        output: PathBuf,
        frames: u64,
        /// Discovered images that failed to stat or decode and were dropped.
        skipped: u64,
    },
    NoImagesFound,
    Cancelled,
}

/// Outcome plus the scan statistics the final summary wants.
#[derive(Debug)]
pub struct ConvertSummary {
    pub outcome: ConversionOutcome,
    pub folders_scanned: u64,
    pub format_counts: BTreeMap<String, u64>,
}

/// Run the whole pipeline: scan, order, transform, encode.
///
/// `output = None` models the original tool's cancelled save prompt: the
/// run ends as `Cancelled` with nothing written and no error.
///
/// Decode and letterbox run on `config.workers` threads; frames are fed to
/// ffmpeg strictly in chronological order whatever order the workers finish
/// in, and the number of decoded frames alive at once is capped by a fixed
/// in-flight window, not by the size of the input.
pub fn convert(
    config: &ConvertConfig,
    output: Option<&Path>,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<ConvertSummary> {
    sink.stage("scanning");
    let ScanOutcome {
        records,
        folders_scanned,
        skipped: stat_skipped,
        format_counts,
    } = scan::scan_ordered(&config.root, sink);

    let summarize = |outcome| ConvertSummary {
        outcome,
        folders_scanned,
        format_counts: format_counts.clone(),
    };

    if records.is_empty() {
        return Ok(summarize(ConversionOutcome::NoImagesFound));
    }

    let Some(output) = output else {
        return Ok(summarize(ConversionOutcome::Cancelled));
    };
    if cancel.is_cancelled() {
        return Ok(summarize(ConversionOutcome::Cancelled));
    }

    sink.stage("transforming and encoding");
    let container = Container::for_path(output, config.container);
    let outcome = match encode_ordered(config, output, container, records, sink, cancel)? {
        Encoded::Frames { frames, skipped } => ConversionOutcome::Completed {
            output: output.to_path_buf(),
            frames,
            skipped: skipped + stat_skipped,
        },
        Encoded::Empty => ConversionOutcome::NoImagesFound,
        Encoded::Cancelled => ConversionOutcome::Cancelled,
    };
    Ok(summarize(outcome))
}

enum Encoded {
    Frames { frames: u64, skipped: u64 },
    /// Every single image failed to decode; nothing was written.
    Empty,
    Cancelled,
}

type FrameResult = (usize, Result<Vec<u8>, String>);

fn encode_ordered(
    config: &ConvertConfig,
    output: &Path,
    container: Container,
    records: Vec<ImageRecord>,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Encoded> {
    let total = records.len();
    let workers = config.workers.max(1).min(total);
    // Decoded frames alive at once: in the workers' hands, queued in the
    // results channel, or parked in the reorder buffer.
    let window = workers * 2;

    let (job_tx, job_rx) = bounded::<(usize, ImageRecord)>(workers);
    let (result_tx, result_rx) = bounded::<FrameResult>(window);
    let (permit_tx, permit_rx) = bounded::<()>(window);
    for _ in 0..window {
        permit_tx.send(()).expect("fresh permit channel has room");
    }

    let resolution = config.resolution;
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || decode_worker(job_rx, result_tx, resolution));
        }
        drop(job_rx);
        drop(result_tx);

        let feeder_cancel = cancel.clone();
        scope.spawn(move || {
            feed_jobs(records, job_tx, permit_rx, &feeder_cancel);
        });

        consume_ordered(
            output,
            container,
            resolution,
            total,
            result_rx,
            permit_tx,
            sink,
            cancel,
        )
    })
}

fn decode_worker(
    job_rx: Receiver<(usize, ImageRecord)>,
    result_tx: Sender<FrameResult>,
    resolution: Resolution,
) {
    while let Ok((index, record)) = job_rx.recv() {
        let rendered = frame::render_frame(&record.path, resolution)
            .map_err(|err| format!("skipping {}: {err:#}", record.path.display()));
        if result_tx.send((index, rendered)).is_err() {
            // Consumer went away (cancelled or failed); nothing left to do.
            return;
        }
    }
}

fn feed_jobs(
    records: Vec<ImageRecord>,
    job_tx: Sender<(usize, ImageRecord)>,
    permit_rx: Receiver<()>,
    cancel: &CancelToken,
) {
    for (index, record) in records.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return;
        }
        // One permit per frame in flight; the consumer returns it once the
        // frame has been written or dropped.
        if permit_rx.recv().is_err() {
            return;
        }
        if job_tx.send((index, record)).is_err() {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn consume_ordered(
    output: &Path,
    container: Container,
    resolution: Resolution,
    total: usize,
    result_rx: Receiver<FrameResult>,
    permit_tx: Sender<()>,
    sink: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<Encoded> {
    let mut encoder: Option<VideoEncoder> = None;
    let mut pending: HashMap<usize, Result<Vec<u8>, String>> = HashMap::new();
    let mut next_index = 0usize;
    let mut written = 0u64;
    let mut skipped = 0u64;

    while next_index < total {
        if cancel.is_cancelled() {
            if let Some(enc) = encoder.take() {
                enc.abort();
            }
            return Ok(Encoded::Cancelled);
        }

        let frame = match pending.remove(&next_index) {
            Some(frame) => frame,
            None => {
                let Ok((index, frame)) = result_rx.recv() else {
                    // All workers gone with frames still owed: only happens
                    // after cancellation tore down the feeder.
                    if let Some(enc) = encoder.take() {
                        enc.abort();
                    }
                    return Ok(Encoded::Cancelled);
                };
                if index != next_index {
                    pending.insert(index, frame);
                    continue;
                }
                frame
            }
        };

        match frame {
            Ok(rgb) => {
                if encoder.is_none() {
                    // Spawned on the first real frame so an all-skip run
                    // never creates a file.
                    encoder = Some(VideoEncoder::spawn(
                        output,
                        resolution,
                        FRAMES_PER_SECOND,
                        container,
                    )?);
                }
                let enc = encoder.as_mut().expect("just spawned");
                if let Err(err) = enc.write_frame(&rgb) {
                    if let Some(enc) = encoder.take() {
                        enc.abort();
                    }
                    return Err(err);
                }
                written += 1;
            }
            Err(message) => {
                sink.warn(&message);
                skipped += 1;
            }
        }

        next_index += 1;
        sink.frame_done(written, total as u64);
        let _ = permit_tx.send(());
    }

    let Some(enc) = encoder else {
        return Ok(Encoded::Empty);
    };
    enc.finish()?;
    Ok(Encoded::Frames {
        frames: written,
        skipped,
    })
}
