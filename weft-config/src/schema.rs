// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Typed mirror of the JSON topology file format.
//!
//! Parsed with `serde_json` into these structs rather than poked at as
//! loose [`serde_json::Value`]s, so a malformed file is rejected by
//! [`ConfigError::Parse`](crate::error::ConfigError::Parse) up front instead
//! of producing confusing failures deeper in the factory.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;

/// A whole topology file, after any `include` directives have been
/// expanded into it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TopologyConfig {
    /// Other JSON files to merge into this one before anything else is
    /// processed, in listed order. Relative to the including file.
    #[serde(default)]
    pub include: Vec<String>,
    /// Every module instance in the topology, keyed by instance name, in
    /// the order they appear in the file. Instantiation and per-cycle tick
    /// registration both walk this order, so declaration order in the
    /// config is the order modules come up and tick within a cycle.
    #[serde(default)]
    pub modules: IndexMap<String, ModuleDesc>,
    /// Named sets of instances, referenceable from a connection endpoint
    /// as `group:name`.
    #[serde(default)]
    pub groups: HashMap<String, GroupDef>,
    /// Every point-to-point link to create once all modules exist.
    #[serde(default)]
    pub connections: Vec<ConnectionDesc>,
}

/// One module (simple or composite) to instantiate.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleDesc {
    /// The registered type name the factory will look up — either a
    /// simple-module constructor or a composite definition.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Free-form construction parameters, passed through verbatim to the
    /// type's constructor.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Layout coordinates, stored verbatim and never interpreted by the
    /// factory itself — a visualizer reads them back off the live
    /// [`LayoutInfo`](weft_engine::LayoutInfo), the simulation never does.
    #[serde(default)]
    pub layout: Option<Layout>,
    /// Present only on composite module types: the internal topology this
    /// instance expands to.
    #[serde(default)]
    pub internal: Option<Box<TopologyConfig>>,
    /// Present only on composite module types: external alias name to
    /// internal `"instance.port"` path, for ports the outside world may
    /// address directly on this instance.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
}

/// A module instance's `(x, y)` position, as given in its config entry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Layout {
    pub x: f64,
    pub y: f64,
}

/// A named collection of module instances, addressable from a connection
/// endpoint as `group:name`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GroupDef {
    pub members: Vec<String>,
}

/// One link between two endpoint patterns.
///
/// A link carries `n` virtual channels in each direction, `n` given by
/// whichever of `vc_priorities`/`input_buffer_sizes`/`output_buffer_sizes`
/// is longest. A missing buffer size defaults to a capacity-4 VC; a
/// missing priority defaults to the VC's own index.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDesc {
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_latency")]
    pub latency: u64,
    #[serde(default)]
    pub input_buffer_sizes: Vec<usize>,
    #[serde(default)]
    pub output_buffer_sizes: Vec<usize>,
    #[serde(default)]
    pub vc_priorities: Vec<u8>,
}

impl ConnectionDesc {
    /// Number of VCs this link carries per direction, and the
    /// per-VC `(input_capacity, output_capacity, priority)` triples,
    /// defaults applied.
    #[must_use]
    pub fn vc_plan(&self) -> Vec<(usize, usize, u8)> {
        let n = self
            .vc_priorities
            .len()
            .max(self.input_buffer_sizes.len())
            .max(self.output_buffer_sizes.len())
            .max(1);
        (0..n)
            .map(|i| {
                let input = self.input_buffer_sizes.get(i).copied().unwrap_or(4);
                let output = self.output_buffer_sizes.get(i).copied().unwrap_or(4);
                let priority = self.vc_priorities.get(i).copied().unwrap_or(i as u8);
                (input, output, priority)
            })
            .collect()
    }
}

fn default_latency() -> u64 {
    0
}
