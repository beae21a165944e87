#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use asset_loom::error::{AssemblyError, FetchError};
use asset_loom::{Assembler, Fetcher, Loader, LoaderConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Scriptable fetcher: each locator maps to a queue of canned outcomes,
/// consumed one per attempt, and every attempt is counted. `hold`/`release`
/// gate all fetches so a test can pile up concurrent requests before any
/// part resolves.
pub(crate) struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: watch::Sender<bool>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate,
        })
    }

    pub fn script(&self, locator: &str, outcomes: Vec<Result<Vec<u8>, FetchError>>) {
        self.scripts
            .lock()
            .entry(locator.to_owned())
            .or_default()
            .extend(outcomes);
    }

    pub fn ok(&self, locator: &str, bytes: &[u8]) {
        self.script(locator, vec![Ok(bytes.to_vec())]);
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        let mut gate = self.gate.subscribe();
        while !*gate.borrow_and_update() {
            if gate.changed().await.is_err() {
                break;
            }
        }
        *self.calls.lock().entry(locator.to_owned()).or_insert(0) += 1;
        match self.scripts.lock().get_mut(locator).and_then(|q| q.pop_front()) {
            Some(outcome) => outcome,
            None => Err(FetchError::Permanent(format!(
                "no scripted response for {locator}"
            ))),
        }
    }
}

/// Joins the three buffers with `|`; a missing image becomes `!`.
pub(crate) struct ConcatAssembler;

impl Assembler for ConcatAssembler {
    type Artifact = Vec<u8>;

    fn assemble(
        &self,
        geometry: &[u8],
        material: &[u8],
        image: Option<&[u8]>,
    ) -> Result<Vec<u8>, AssemblyError> {
        let mut out = geometry.to_vec();
        out.push(b'|');
        out.extend_from_slice(material);
        out.push(b'|');
        match image {
            Some(image) => out.extend_from_slice(image),
            None => out.push(b'!'),
        }
        Ok(out)
    }
}

/// Rejects every input; for assembly-error propagation tests.
pub(crate) struct FailingAssembler;

impl Assembler for FailingAssembler {
    type Artifact = Vec<u8>;

    fn assemble(&self, _: &[u8], _: &[u8], _: Option<&[u8]>) -> Result<Vec<u8>, AssemblyError> {
        Err(AssemblyError("scripted assembly failure".to_owned()))
    }
}

pub(crate) fn concat_loader(fetcher: Arc<MockFetcher>) -> Loader<ConcatAssembler> {
    Loader::new(fetcher, ConcatAssembler, LoaderConfig::default())
}

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `condition` until it holds or a generous deadline passes.
pub(crate) async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
