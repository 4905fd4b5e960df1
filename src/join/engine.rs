//! The parallel, order-preserving join.
//!
//! A producer thread reads the query, checks its sort order and cuts it into
//! chunks. For each chunk it pulls a snapshot of candidates from every
//! source cursor and hands the chunk to a fixed-size worker pool. The caller
//! iterates a [`JoinStream`], which puts finished chunks back in input order.
//!
//! At most `2 * threads` chunks are in flight at once: the producer takes a
//! slot before dispatching a chunk and the stream frees it once the chunk has
//! been released in order.

use super::chunk::{extent, Chunk, ChunkBuilder};
use super::reorder::ReorderBuffer;
use super::AnnotatedRecord;
use crate::annotate::Annotator;
use crate::config::JoinConfig;
use crate::error::{AnnoError, Result};
use crate::interval::Interval;
use crate::record::Record;
use crate::report::ErrorReporter;
use crate::source::SourceCursor;
use crate::streaming::SortValidator;
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Name used for the query stream in sort-order errors.
const QUERY_NAME: &str = "query";

type Batch = (u64, Vec<AnnotatedRecord>);
type FatalSlot = Arc<Mutex<Option<AnnoError>>>;

pub struct JoinEngine {
    config: JoinConfig,
    reporter: Arc<ErrorReporter>,
}

impl JoinEngine {
    pub fn new(config: JoinConfig) -> Self {
        Self {
            config,
            reporter: Arc::new(ErrorReporter::default()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn reporter(&self) -> &Arc<ErrorReporter> {
        &self.reporter
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    /// Start joining `query` against `cursors` (as returned by
    /// [`Annotator::setup`]).
    ///
    /// The query must be sorted under the annotator's chromosome order. A
    /// sort violation, in the query or in any source, ends the stream with
    /// an `OutOfOrder` error after every record before it has been emitted.
    pub fn run<Q>(
        &self,
        query: Q,
        cursors: Vec<SourceCursor>,
        annotator: Arc<Annotator>,
    ) -> Result<JoinStream>
    where
        Q: IntoIterator<Item = Result<Record>>,
        Q::IntoIter: Send + 'static,
    {
        let config = self.config;
        if config.threads == 0 {
            return Err(AnnoError::config("need at least one worker thread"));
        }
        if config.max_chunk == 0 {
            return Err(AnnoError::config("max chunk size must be at least 1"));
        }
        if cursors.len() != annotator.sources().len() {
            return Err(AnnoError::config(format!(
                "{} cursors for {} sources",
                cursors.len(),
                annotator.sources().len()
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("annojoin-worker-{}", i))
            .build()
            .map_err(|e| AnnoError::config(format!("failed to build worker pool: {}", e)))?;
        let pool = Arc::new(pool);

        let in_flight = 2 * config.threads;
        let (slot_tx, slot_rx) = bounded::<()>(in_flight);
        let (result_tx, result_rx) = bounded::<Batch>(in_flight);
        let fatal: FatalSlot = Arc::new(Mutex::new(None));

        let producer = Producer {
            config,
            cursors,
            annotator,
            reporter: Arc::clone(&self.reporter),
            pool: Arc::clone(&pool),
            slots: slot_tx,
            results: result_tx,
            serial: 0,
            ordinal: 0,
        };
        let query = query.into_iter();
        let fatal_slot = Arc::clone(&fatal);
        let handle = thread::Builder::new()
            .name("annojoin-producer".to_string())
            .spawn(move || producer.run(query, fatal_slot))?;

        Ok(JoinStream {
            results: Some(result_rx),
            slots: Some(slot_rx),
            reorder: ReorderBuffer::new(),
            current: Vec::new().into_iter(),
            fatal,
            producer: Some(handle),
            _pool: pool,
            emitted: 0,
            done: false,
        })
    }
}

/// State owned by the producer thread.
struct Producer {
    config: JoinConfig,
    cursors: Vec<SourceCursor>,
    annotator: Arc<Annotator>,
    reporter: Arc<ErrorReporter>,
    pool: Arc<ThreadPool>,
    slots: Sender<()>,
    results: Sender<Batch>,
    serial: u64,
    ordinal: u64,
}

impl Producer {
    fn run<I>(mut self, query: I, fatal: FatalSlot)
    where
        I: Iterator<Item = Result<Record>>,
    {
        if let Err(e) = self.produce(query) {
            log::debug!("producer stopped after {} chunks: {}", self.serial, e);
            *fatal.lock().unwrap_or_else(PoisonError::into_inner) = Some(e);
        }
    }

    fn produce<I>(&mut self, query: I) -> Result<()>
    where
        I: Iterator<Item = Result<Record>>,
    {
        let mut validator =
            SortValidator::defining(QUERY_NAME, self.annotator.chrom_order().clone());
        let mut builder = ChunkBuilder::new(self.config.max_chunk, self.config.max_gap);

        for record in query {
            let checked = record.and_then(|r| {
                validator.validate(r.chrom(), r.start())?;
                Ok(r)
            });
            let record = match checked {
                Ok(r) => r,
                Err(e) => {
                    // records read before the bad one are still emitted
                    if let Some(records) = builder.finish() {
                        self.dispatch(records)?;
                    }
                    return Err(e);
                }
            };
            if let Some(records) = builder.push(record) {
                if !self.dispatch(records)? {
                    return Ok(());
                }
            }
        }
        if let Some(records) = builder.finish() {
            self.dispatch(records)?;
        }
        Ok(())
    }

    /// Send one chunk to the pool. Returns false once the stream is gone.
    fn dispatch(&mut self, records: Vec<Record>) -> Result<bool> {
        let (lo, hi) = extent(&records);
        let chrom = records[0].chrom().to_string();

        let mut candidates = Vec::with_capacity(self.cursors.len());
        for cursor in &mut self.cursors {
            cursor.advance_past(&chrom, lo)?;
            candidates.push(cursor.window(&chrom, lo, hi)?);
        }

        if self.slots.send(()).is_err() {
            return Ok(false);
        }

        let chunk = Chunk {
            serial: self.serial,
            first_ordinal: self.ordinal,
            records,
            candidates,
        };
        log::debug!(
            "dispatching chunk {} ({} records, {}:{}-{})",
            chunk.serial,
            chunk.records.len(),
            chrom,
            lo,
            hi
        );
        self.serial += 1;
        self.ordinal += chunk.records.len() as u64;

        let annotator = Arc::clone(&self.annotator);
        let reporter = Arc::clone(&self.reporter);
        let results = self.results.clone();
        let mode = self.config.ends;
        self.pool.spawn(move || {
            let serial = chunk.serial;
            let annotated = chunk.annotate(&annotator, mode, &reporter);
            // a closed channel means the stream was dropped
            let _ = results.send((serial, annotated));
        });
        Ok(true)
    }
}

/// Annotated records in input order.
///
/// Yields `Err` at most once, for a fatal error, and then ends. Dropping the
/// stream early stops the producer.
pub struct JoinStream {
    results: Option<Receiver<Batch>>,
    slots: Option<Receiver<()>>,
    reorder: ReorderBuffer<Vec<AnnotatedRecord>>,
    current: std::vec::IntoIter<AnnotatedRecord>,
    fatal: FatalSlot,
    producer: Option<JoinHandle<()>>,
    _pool: Arc<ThreadPool>,
    emitted: u64,
    done: bool,
}

impl JoinStream {
    /// Records yielded so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn join_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                log::error!("annotation producer thread panicked");
            }
        }
    }
}

impl Iterator for JoinStream {
    type Item = Result<AnnotatedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.current.next() {
                self.emitted += 1;
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Some(batch) = self.reorder.pop_ready() {
                if let Some(slots) = &self.slots {
                    let _ = slots.try_recv();
                }
                self.current = batch.into_iter();
                continue;
            }

            let received = self.results.as_ref().and_then(|rx| rx.recv().ok());
            match received {
                Some((serial, batch)) => self.reorder.insert(serial, batch),
                None => {
                    // producer and every worker are finished
                    self.done = true;
                    self.join_producer();
                    let fatal = self
                        .fatal
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take();
                    if let Some(e) = fatal {
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

impl Drop for JoinStream {
    fn drop(&mut self) {
        // disconnecting the channels unblocks a producer waiting for a slot
        self.results = None;
        self.slots = None;
        self.join_producer();
    }
}
