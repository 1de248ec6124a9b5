// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Global Kahn layering over active dependency edges, projected per process.
//!
//! A method with declared consumer slots but zero active dependencies can
//! never become ready: nothing will ever feed its queues. Per the
//! preserved open question (see DESIGN.md), such a method is treated as
//! inactive and skipped here — it never receives a layer and never
//! appears in any process's layer list.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::graph::partition::ProcessId;
use crate::method::{DataMethod, MethodId};

/// The frozen layer plan: for each process, an ordered list of layers,
/// each a set of methods ready to be considered together. List order is
/// the process's own compacted view of the global layering — a global
/// layer with no members in a given process simply does not appear in
/// that process's list.
pub struct Plan {
    pub layers_by_process: AHashMap<ProcessId, Vec<Vec<MethodId>>>,
}

pub fn layer(methods: &[DataMethod], process_of: &[ProcessId]) -> Result<Plan> {
    let n = methods.len();
    let active: Vec<bool> = methods
        .iter()
        .map(|m| m.arity() == 0 || m.active_dependencies().next().is_some())
        .collect();

    let mut remaining_deps = vec![0u32; n];
    for (idx, method) in methods.iter().enumerate() {
        if !active[idx] {
            continue;
        }
        remaining_deps[idx] = method
            .active_dependencies()
            .filter(|(dep_id, _)| active[dep_id.0 as usize])
            .count() as u32;
    }

    let mut ready: Vec<MethodId> = (0..n)
        .filter(|&idx| active[idx] && remaining_deps[idx] == 0)
        .map(|idx| MethodId(idx as u32))
        .collect();

    let mut global_layer_of: Vec<Option<u32>> = vec![None; n];
    let mut global_layer = 0u32;
    let mut visited = 0usize;

    while !ready.is_empty() {
        let mut next_ready = Vec::new();
        for &method_id in &ready {
            global_layer_of[method_id.0 as usize] = Some(global_layer);
            visited += 1;
            let method = &methods[method_id.0 as usize];
            for (dependent_id, _) in method.active_dependents() {
                if !active[dependent_id.0 as usize] {
                    continue;
                }
                let counter = &mut remaining_deps[dependent_id.0 as usize];
                *counter -= 1;
                if *counter == 0 {
                    next_ready.push(dependent_id);
                }
            }
        }
        ready = next_ready;
        global_layer += 1;
    }

    let active_count = active.iter().filter(|&&a| a).count();
    if visited != active_count {
        return Err(Error::Topology(
            "cycle detected among active dependency edges; layering cannot proceed".into(),
        ));
    }

    let mut per_process: AHashMap<ProcessId, BTreeMap<u32, Vec<MethodId>>> = AHashMap::new();
    for idx in 0..n {
        if !active[idx] {
            continue;
        }
        let method_id = MethodId(idx as u32);
        let global = global_layer_of[idx].expect("visited methods are always assigned a layer");
        per_process
            .entry(process_of[idx])
            .or_default()
            .entry(global)
            .or_default()
            .push(method_id);
    }

    let layers_by_process = per_process
        .into_iter()
        .map(|(process_id, layers)| (process_id, layers.into_values().collect()))
        .collect();

    Ok(Plan { layers_by_process })
}
