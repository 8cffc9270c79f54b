// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Composite modules: named groups of instantiated sub-modules that expose
//! a subset of their internal ports to the outside world under their own
//! alias names.
//!
//! Grounded in the original prototype's `SimModule::findInternalPath`: a
//! connection naming `"cluster0.north"` is rewritten, before any port is
//! looked up, to whatever internal `"instance.port"` path `cluster0`'s
//! alias table has registered for `"north"`. Unlike the original, a port
//! nobody wires into an alias stays unaddressable from outside — see
//! `DESIGN.md` for why `exposeUnconnectedPorts`'s auto-promotion wasn't
//! carried over.

use std::collections::HashMap;

/// One composite module instance's alias tables, keyed by the qualified
/// instance name the factory assigned it.
#[derive(Debug, Clone, Default)]
pub struct CompositeModule {
    pub instance_name: String,
    /// External alias -> internal `"instance.port"`, for ports this
    /// composite sends data out of.
    pub outputs: HashMap<String, String>,
    /// External alias -> internal `"instance.port"`, for ports this
    /// composite receives data on.
    pub inputs: HashMap<String, String>,
}

impl CompositeModule {
    #[must_use]
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            outputs: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    /// Translate an external alias to the internal `"instance.port"` path
    /// it stands for, checking both tables since a caller addressing a
    /// composite's port doesn't know (or care) which direction it is.
    #[must_use]
    pub fn resolve_alias(&self, alias: &str) -> Option<&str> {
        self.outputs
            .get(alias)
            .or_else(|| self.inputs.get(alias))
            .map(String::as_str)
    }
}
