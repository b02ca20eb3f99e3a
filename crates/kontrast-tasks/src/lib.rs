// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kontrast tasks: asynchronous job orchestration, the large-image
// optimisation policy, and the processing history log.

pub mod estimate;
pub mod history;
pub mod jobs;
pub mod orchestrator;
pub mod policy;

pub use estimate::estimate_duration;
pub use history::{CompletedRun, HistorySink, JsonHistory, NullHistory};
pub use jobs::JobKind;
pub use orchestrator::{TaskOrchestrator, TaskOutput, TaskRequest, TaskView};
pub use policy::{Adjustment, OptimizationPlan, OptimizationPolicy};
