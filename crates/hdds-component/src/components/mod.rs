// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundled components served by the `hdds-component` binary.

mod echo;
mod memory;
mod ticker;

pub use echo::EchoBinding;
pub use memory::MemoryPubSub;
pub use ticker::TickerBinding;
