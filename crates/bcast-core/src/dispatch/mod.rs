//! Bulk message dispatcher.
//!
//! Flow: sizing picks a recipient source and tuning, the controller draws
//! fixed-size batches from the source, the batch processor fans each batch out
//! to the transport, and the reporter folds outcomes into a run tally.

pub mod batch;
pub mod controller;
pub mod options;
pub mod report;
pub mod sizing;
pub mod source;
pub mod tokenizer;

pub use batch::process_batch;
pub use controller::{
    Dispatcher, NoYield, NoopProgress, ProgressSink, RunHooks, TokioYield, YieldHook,
};
pub use options::DispatchOptions;
pub use report::{BatchOutcome, ProgressSnapshot, RunTally};
pub use sizing::{estimate_count, plan_file_source, SizingPolicy, SourcePlan, Strategy};
pub use source::{MaterializedSource, RecipientSource, StreamingSource};

#[cfg(test)]
pub(crate) mod testing;
