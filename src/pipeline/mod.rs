//! Staged, bounded-buffer concurrent pipeline.
//!
//! A pipeline is a flat list of processes wired together through bounded
//! crossbeam channels before `run`. Every process except the last runs on
//! its own thread; the last runs in the caller's thread so `run` returns
//! only once the pipeline has drained. A process closes its output by
//! dropping the sender when it finishes (or fails), which downstream
//! receivers observe as the end of their input.

pub mod haplotype;
pub mod index;
pub mod sketch;

use anyhow::{anyhow, Result};

/// Buffer size of every pipeline channel; a full channel blocks the producer
/// and is the sole backpressure mechanism.
pub const BUFFER_SIZE: usize = 128;

/// A pipeline stage. Implementations own their input receiver and output
/// sender; `run` consumes the input to completion.
pub trait Process: Send {
    fn run(&mut self) -> Result<()>;
}

/// An ordered list of processes.
#[derive(Default)]
pub struct Pipeline {
    processes: Vec<Box<dyn Process>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn add(&mut self, process: Box<dyn Process>) {
        self.processes.push(process);
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Run the pipeline to drain, returning the first stage error observed.
    pub fn run(&mut self) -> Result<()> {
        let Some(mut last) = self.processes.pop() else {
            return Ok(());
        };
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.processes.len());
            for process in &mut self.processes {
                handles.push(scope.spawn(move || process.run()));
            }
            let last_result = last.run();

            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error.get_or_insert(anyhow!("pipeline stage panicked"));
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            last_result
        })
    }
}
