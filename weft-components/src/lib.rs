// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Traffic-generating and traffic-sinking fixtures built directly on top of
//! [`weft_engine`], used by the workspace's own tests and by worked
//! examples such as `demos/mesh-demo`.
//!
//! None of these components are registered with a topology on their own:
//! construct them, then hand them to a factory (or, in a standalone test,
//! connect their ports and drive `engine.run` directly) the same way any
//! other [`SimObject`](weft_engine::SimObject) is used.

pub mod sink;
pub mod source;
pub mod store;
pub mod test_helpers;

pub use sink::Sink;
pub use source::{Generator, Source};
pub use store::Store;
