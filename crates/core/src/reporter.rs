use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Progress events emitted by the core for UI and logging sinks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReporterEvent {
  BuildStart,
  #[serde(rename_all = "camelCase")]
  BuildProgress {
    phase: BuildPhase,
    file_path: PathBuf,
  },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildPhase {
  Transforming,
}

pub trait Reporter: Send + Sync {
  fn report(&self, event: &ReporterEvent) -> anyhow::Result<()>;
}

pub type ReporterRef = Arc<dyn Reporter>;

/// Fans one event out to a list of sinks.
pub struct CompositeReporter {
  reporters: Vec<ReporterRef>,
}

impl CompositeReporter {
  pub fn new(reporters: Vec<ReporterRef>) -> Self {
    CompositeReporter { reporters }
  }
}

impl Reporter for CompositeReporter {
  fn report(&self, event: &ReporterEvent) -> anyhow::Result<()> {
    let mut failed = 0;
    for reporter in &self.reporters {
      if let Err(err) = reporter.report(event) {
        failed += 1;
        tracing::error!("reporter failed: {}", err);
      }
    }
    if failed > 0 {
      anyhow::bail!("{} reporter(s) failed", failed);
    }
    Ok(())
  }
}

/// Discards every event.
#[derive(Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
  fn report(&self, _event: &ReporterEvent) -> anyhow::Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  #[derive(Default)]
  struct Recording {
    events: Mutex<Vec<ReporterEvent>>,
  }

  impl Reporter for Recording {
    fn report(&self, event: &ReporterEvent) -> anyhow::Result<()> {
      self.events.lock().push(event.clone());
      Ok(())
    }
  }

  #[test]
  fn composite_fans_out() {
    let a = Arc::new(Recording::default());
    let b = Arc::new(Recording::default());
    let composite = CompositeReporter::new(vec![a.clone(), b.clone()]);
    composite.report(&ReporterEvent::BuildStart).unwrap();
    assert_eq!(a.events.lock().len(), 1);
    assert_eq!(b.events.lock().len(), 1);
  }
}
