// Copyright 2026 jitport contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]
#![allow(dead_code)]
// - 'signal/' talks to the OS through libc and is necessarily unsafe
// - 'signal/sync.rs' resumes a saved ucontext to unwind out of a handler

//! # jitport
//!
//! The two hard kernels of a JIT runtime, as a standalone library: an
//! optimizer orchestrator that sequences tree and flow transformations over
//! an intermediate representation while managing the lifetimes of derived
//! analyses, and a process-wide POSIX signal dispatch and protection
//! subsystem with scoped fault handlers and a dedicated asynchronous
//! reporter thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Optimizer (component O)                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Strategy              ordered {opt, guard} recipe, groups       │
//! │     │                  recurse into sub-strategies               │
//! │     ▼                                                            │
//! │  Optimizer driver      guard evaluation → analysis               │
//! │     │                  materialization → pass dispatch →         │
//! │     │                  cache reconciliation                      │
//! │     ▼                                                            │
//! │  AnalysisCaches        alias sets · use-defs · value numbers ·   │
//! │     │                  symref table · structure census           │
//! │     ▼                                                            │
//! │  Passes                opaque transforms behind the              │
//! │                        OptimizationPass contract                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  Signal dispatch (component S)                   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  OS signal ──► main handler                                      │
//! │    synchronous: walk per-thread protection frames, dispatch,     │
//! │                 optionally unwind to the protected call          │
//! │    asynchronous: count atomically, post the reporter wake-up     │
//! │  reporter thread ──► runHandlers ──► registered listeners        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key components
//!
//! - [`ir`] — the compact reference IR the optimizer drives: expression
//!   trees in a node pool, basic blocks, a flow graph with structure and
//!   frequencies, and a symbol-reference table.
//! - [`optimizer`] — strategies and guards, per-optimization managers,
//!   analysis construction and invalidation, and the driver itself.
//! - [`signal`] — protection frames with non-local return, lazy OS handler
//!   installation, asynchronous fan-out through a single reporter thread,
//!   and cooperative chaining with foreign handlers.
//! - [`Error`] / [`Result`] — unified error handling.
//!
//! # Usage
//!
//! Optimizing a method:
//!
//! ```rust
//! use jitport::optimizer::{Compilation, Hotness, Optimizer};
//! use jitport::ir::Method;
//!
//! let mut comp = Compilation::new(Method::new("sample"), Hotness::Warm);
//! let mut optimizer = Optimizer::create(&mut comp, false)?;
//! optimizer.optimize(&mut comp)?;
//! # Ok::<(), jitport::Error>(())
//! ```
//!
//! Protecting a call against synchronous faults:
//!
//! ```rust,no_run
//! use jitport::signal::{self, HandlerDisposition, Protected, SigFlags};
//!
//! signal::startup()?;
//! fn on_fault(_info: &signal::SignalInfo, _arg: usize) -> HandlerDisposition {
//!     HandlerDisposition::ExceptionReturn
//! }
//! let outcome = signal::protect(
//!     || unsafe { libc::raise(libc::SIGSEGV) as usize },
//!     on_fault,
//!     0,
//!     SigFlags::SEGV | SigFlags::MAY_RETURN,
//! )?;
//! assert!(matches!(outcome, Protected::ExceptionOccurred));
//! signal::shutdown()?;
//! # Ok::<(), jitport::Error>(())
//! ```

pub mod ir;
pub mod optimizer;
pub mod signal;

mod error;

pub use error::{Error, Result};
