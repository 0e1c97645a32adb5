//! `rewind run`: drive a continuable from a class directory.

use anyhow::Context;
use rewind_engine::{
    BasicContinuableRunner, DirectoryClassProvider, InstrumentConfig, RunOutcome, RuntimeSettings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RunOptions {
    pub settings: Option<PathBuf>,
    pub steps: Option<usize>,
    pub clone: bool,
}

pub fn execute(
    config: Arc<dyn InstrumentConfig>,
    classpath: &Path,
    class: &str,
    options: RunOptions,
) -> anyhow::Result<()> {
    let settings = match &options.settings {
        Some(path) => RuntimeSettings::load(path)
            .with_context(|| format!("loading runtime settings {}", path.display()))?,
        None => RuntimeSettings::default(),
    };
    let runner = BasicContinuableRunner::new(
        Arc::new(DirectoryClassProvider::new(classpath)),
        config,
        settings,
    );
    runner.clone_continuations(options.clone);

    let mut outcome = runner.start(class)?;
    report(&outcome);
    let mut resumes = 0;
    while let Some(id) = outcome.id.clone() {
        if options.steps.is_some_and(|max| resumes >= max) {
            println!("stopped after {} resumes; continue with id {}", resumes, id);
            return Ok(());
        }
        outcome = runner.resume(&id)?;
        resumes += 1;
        report(&outcome);
    }
    println!("finished after {} resumes", resumes);
    Ok(())
}

fn report(outcome: &RunOutcome) {
    match &outcome.id {
        Some(id) => println!("paused   {}", id),
        None => println!("done"),
    }
}
