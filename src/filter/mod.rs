//! Response filter subsystem: content-type inference.
//!
//! # Data Flow
//! ```text
//! Response from handler (status + headers, body frames)
//!     → chain.rs (ordered filters, header stage then body stage)
//!     → guess.rs header stage: withhold headers on enabled routes
//!     → guess.rs body stage, first chunk only:
//!         marker.rs (set-once per request)
//!         table.rs (extension lookup against the route's default type)
//!         classifier.rs (signature sniffing when the table is inconclusive)
//!     → corrected Content-Type written into context.rs header set
//!     → header chain re-run from the top, headers released
//!     → chunks forwarded unchanged, in order
//! ```
//!
//! # Design Decisions
//! - Filters are composed once into an explicit ordered list
//! - Per-request state lives in request extensions, never in globals
//! - The classifier only ever sees the first chunk (bounded memory)
//! - Classifier failures degrade to the default type, never to an error page

pub mod chain;
pub mod classifier;
pub mod context;
pub mod guess;
pub mod marker;
pub mod table;

pub use chain::{ChainBuilder, ChainError, Decision, FilterChain, Next, ResponseFilter};
pub use classifier::{ClassifyError, Classifier, InferClassifier};
pub use context::{ChunkSequence, FilterError, FilterSettings, ResponseContext};
pub use guess::{GuessMimeFilter, ResolvedType, TypeSource, DIAGNOSTIC_HEADER};
pub use marker::ProcessingMarker;
pub use table::{ExtensionTable, TableLookup, TypeTable};
