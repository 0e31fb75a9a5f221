//! A load, index and query benchmark for a document store cluster.
//!
//! A run executes exactly one phase against the cluster:
//!
//!  - [`load`] populates the bucket with synthetic documents whose keys are zero-padded ids and
//!    whose emails embed those keys (see [`keys`]).
//!  - [`index`] creates the email view and one range index per node, sharded by
//!    [`partition::PartitionPlan`].
//!  - [`runner`] drives endless concurrent lookups through one of the [`strategy`]
//!    implementations.
//!
//! Every store call is measured by the [`timer`] and written to stdout as a
//! `<label>,<milliseconds>` line.
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod discovery;
pub mod index;
pub mod keys;
pub mod load;
pub mod observability;
pub mod partition;
pub mod runner;
pub mod strategy;
pub mod timer;
