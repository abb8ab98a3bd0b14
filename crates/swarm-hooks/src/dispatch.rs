use crate::error::HookError;
use crate::hook::Hook;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Computes the total dispatch order for `hooks`: a topological sort of the
/// dependency DAG (Kahn's algorithm), tie-broken by `(priority, insertion
/// index)` among hooks with no remaining unscheduled dependency.
///
/// `insertion_order` maps hook name -> the order it was registered in, used
/// only as the final tie-break so dispatch order is deterministic.
pub fn topological_order(
    hooks: &HashMap<String, Hook>,
    insertion_order: &HashMap<String, u64>,
) -> Result<Vec<String>, HookError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for hook in hooks.values() {
        in_degree.entry(hook.name.as_str()).or_insert(0);
        for dep in &hook.dependencies {
            *in_degree.entry(hook.name.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(hook.name.as_str());
        }
    }

    // Ready set ordered by (priority, insertion_index) so ties resolve
    // deterministically; a BTreeMap keyed by that tuple acts as a priority queue.
    let mut ready: BTreeMap<(u8, u64, String), ()> = BTreeMap::new();
    for hook in hooks.values() {
        if in_degree.get(hook.name.as_str()).copied().unwrap_or(0) == 0 {
            let order = insertion_order.get(&hook.name).copied().unwrap_or(u64::MAX);
            ready.insert((hook.priority as u8, order, hook.name.clone()), ());
        }
    }

    let mut result = Vec::with_capacity(hooks.len());
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(u8, u64, String)> = VecDeque::new();

    while !ready.is_empty() || !queue.is_empty() {
        if queue.is_empty() {
            if let Some((key, _)) = ready.iter().next().map(|(k, v)| (k.clone(), *v)) {
                ready.remove(&key);
                queue.push_back(key);
            }
        }
        let Some((_, _, name)) = queue.pop_front() else { break };
        if !visited.insert(name.clone()) {
            continue;
        }
        result.push(name.clone());

        if let Some(next) = dependents.get(name.as_str()) {
            for &dependent in next {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        let order = insertion_order.get(dependent).copied().unwrap_or(u64::MAX);
                        let dep_hook = &hooks[dependent];
                        ready.insert((dep_hook.priority as u8, order, dependent.to_string()), ());
                    }
                }
            }
        }
    }

    if result.len() != hooks.len() {
        let stuck = hooks.keys().find(|n| !visited.contains(*n)).cloned().unwrap_or_default();
        return Err(HookError::DependencyCycle(stuck));
    }
    Ok(result)
}
