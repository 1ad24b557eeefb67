//! Shared fixtures for unit tests.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::step::{Step, StepError, StepOutcome, StepRunner};

pub(crate) const MANIFEST: &str = r#"{
  "dependencies": [
    { "name": "openssl", "url": "https://www.openssl.org/source/openssl-1.1.1k.tar.gz" },
    { "name": "libplist", "url": "https://github.com/libimobiledevice/libplist.git", "commit": "2d8d7ef" },
    { "name": "libimobiledevice-glue", "url": "https://github.com/libimobiledevice/libimobiledevice-glue.git", "commit": "d2ff796" },
    { "name": "libusbmuxd", "url": "https://github.com/libimobiledevice/libusbmuxd.git", "commit": "e3f1e8c" }
  ]
}"#;

pub(crate) fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

type Effect = Box<dyn Fn(&Step) + Send + Sync>;

/// Records steps instead of running them.
///
/// `on` registers a side effect (usually creating the files a real build
/// would leave behind) for steps whose command line contains a pattern;
/// `fail_on` makes matching steps exit non-zero; `missing` makes them fail
/// to spawn.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    steps: Mutex<Vec<Step>>,
    effects: Vec<(String, Effect)>,
    failures: Vec<String>,
    missing: Vec<String>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(
        mut self,
        pattern: &str,
        effect: impl Fn(&Step) + Send + Sync + 'static,
    ) -> Self {
        self.effects.push((pattern.to_string(), Box::new(effect)));
        self
    }

    pub(crate) fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    pub(crate) fn missing(mut self, pattern: &str) -> Self {
        self.missing.push(pattern.to_string());
        self
    }

    pub(crate) fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.steps().iter().map(Step::command_line).collect()
    }
}

#[async_trait]
impl StepRunner for RecordingRunner {
    async fn run(&self, step: &Step) -> Result<StepOutcome, StepError> {
        self.steps.lock().unwrap().push(step.clone());
        let command = step.command_line();

        if self.missing.iter().any(|p| command.contains(p.as_str())) {
            return Err(StepError::Spawn {
                program: step.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        if self.failures.iter().any(|p| command.contains(p.as_str())) {
            if step.allow_failure {
                return Ok(StepOutcome::FailedAllowed { code: Some(1) });
            }
            return Err(StepError::Failed {
                command,
                code: Some(1),
                log: step.log.clone(),
                tail: None,
            });
        }

        for (pattern, effect) in &self.effects {
            if command.contains(pattern.as_str()) {
                effect(step);
            }
        }
        Ok(StepOutcome::Succeeded)
    }
}
