// SPDX-License-Identifier: MIT
// Copyright (c) 2026 the weft authors

//! Workflow graph: an arena of named [`Step`]s plus input/output declarations.

use super::step::{Action, Step};
use crate::error::GraphConstructionError;
use crate::ids::WorkflowId;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};

/// A DAG of steps plus the input schema and designated outputs (§3).
///
/// Steps live in a `HashMap` arena keyed by name; all cross-references are
/// names, checked acyclic at [`WorkflowBuilder::build`] (Design Notes: cyclic
/// references between steps and workflow).
#[derive(Debug, Clone)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub version: String,
    pub steps: HashMap<SmolStr, Step>,
    pub outputs: Vec<SmolStr>,
    pub input_keys: Vec<String>,
}

impl Workflow {
    pub fn builder(workflow_id: impl Into<WorkflowId>, version: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(workflow_id, version)
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Steps with no predecessors — ready at dispatch time.
    pub fn roots(&self) -> Vec<&SmolStr> {
        self.steps.values().filter(|s| s.predecessors.is_empty()).map(|s| &s.name).collect()
    }

    /// All successor step names reachable from `from` under any action.
    pub fn all_successors_of<'a>(&'a self, from: &str) -> impl Iterator<Item = &'a SmolStr> + 'a {
        self.steps
            .get(from)
            .into_iter()
            .flat_map(|s| s.successors.values())
            .flat_map(|targets| targets.iter())
    }
}

/// Builds a [`Workflow`], validating DAG admissibility (§4.1).
pub struct WorkflowBuilder {
    workflow_id: WorkflowId,
    version: String,
    steps: HashMap<SmolStr, Step>,
    outputs: Vec<SmolStr>,
    input_keys: Vec<String>,
}

impl WorkflowBuilder {
    pub fn new(workflow_id: impl Into<WorkflowId>, version: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            version: version.into(),
            steps: HashMap::new(),
            outputs: Vec::new(),
            input_keys: Vec::new(),
        }
    }

    fn ensure(&mut self, name: &str) -> &mut Step {
        self.steps.entry(SmolStr::new(name)).or_insert_with(|| Step::new(name))
    }

    /// Get (creating if absent) a mutable handle to a step for configuration.
    pub fn step(&mut self, name: &str) -> &mut Step {
        self.ensure(name)
    }

    /// Explicit-edge style: `a.then(b)` sugar at the builder level — adds
    /// both endpoints if missing and records the edge under `action`.
    pub fn then(mut self, from: &str, action: impl Into<Action>, to: &str) -> Self {
        self.ensure(to);
        let action = action.into();
        self.ensure(from).then_action(action.clone(), to);
        let to_step = self.ensure(to);
        to_step.predecessors.insert(SmolStr::new(from));
        self
    }

    pub fn outputs(mut self, names: impl IntoIterator<Item = impl Into<SmolStr>>) -> Self {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn input_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(mut self) -> Result<Workflow, GraphConstructionError> {
        // Declarative dependency_bindings with a StepOutput/ConditionalStepOutput
        // source imply a predecessor edge; make sure the arena has an entry
        // for every referenced step and every predecessor set is mirrored by
        // a default-action successor edge when no explicit edge exists.
        let implied: Vec<(SmolStr, SmolStr)> = self
            .steps
            .values()
            .flat_map(|s| s.predecessors.iter().map(move |p| (p.clone(), s.name.clone())))
            .collect();
        for (pred, succ) in implied {
            if !self.steps.contains_key(&pred) {
                return Err(GraphConstructionError::UnknownPredecessor(succ.to_string(), pred.to_string()));
            }
            let already_linked =
                self.steps[&pred].successors.values().any(|targets| targets.contains(&succ));
            if !already_linked {
                if let Some(step) = self.steps.get_mut(&pred) {
                    step.then(succ);
                }
            }
        }

        for step in self.steps.values() {
            for pred in &step.predecessors {
                if !self.steps.contains_key(pred) {
                    return Err(GraphConstructionError::UnknownPredecessor(
                        step.name.to_string(),
                        pred.to_string(),
                    ));
                }
            }
            for targets in step.successors.values() {
                for t in targets {
                    if !self.steps.contains_key(t) {
                        return Err(GraphConstructionError::UnknownPredecessor(t.to_string(), step.name.to_string()));
                    }
                }
            }
        }

        for out in &self.outputs {
            if !self.steps.contains_key(out) {
                return Err(GraphConstructionError::UnknownOutput(out.to_string()));
            }
        }

        check_acyclic(&self.steps)?;

        Ok(Workflow {
            workflow_id: self.workflow_id,
            version: self.version,
            steps: self.steps,
            outputs: self.outputs,
            input_keys: self.input_keys,
        })
    }
}

fn check_acyclic(steps: &HashMap<SmolStr, Step>) -> Result<(), GraphConstructionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: HashMap<&SmolStr, Mark> =
        steps.keys().map(|k| (k, Mark::Unvisited)).collect();

    fn visit<'a>(
        name: &'a SmolStr,
        steps: &'a HashMap<SmolStr, Step>,
        marks: &mut HashMap<&'a SmolStr, Mark>,
    ) -> Result<(), GraphConstructionError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(GraphConstructionError::Cycle(name.to_string())),
            _ => {}
        }
        marks.insert(name, Mark::InProgress);
        if let Some(step) = steps.get(name) {
            let mut seen: HashSet<&SmolStr> = HashSet::new();
            for targets in step.successors.values() {
                for t in targets {
                    if seen.insert(t) {
                        visit(t, steps, marks)?;
                    }
                }
            }
        }
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let names: Vec<&SmolStr> = steps.keys().collect();
    for name in names {
        visit(name, steps, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_chain_builds() {
        let wf = Workflow::builder("w1", "v1")
            .then("a", Action::default_action(), "b")
            .then("b", Action::default_action(), "c")
            .outputs(["c"])
            .build()
            .unwrap();
        assert_eq!(wf.steps.len(), 3);
        assert!(wf.steps["b"].predecessors.contains("a"));
    }

    #[test]
    fn cycle_is_rejected() {
        let err = Workflow::builder("w1", "v1")
            .then("a", Action::default_action(), "b")
            .then("b", Action::default_action(), "a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphConstructionError::Cycle(_)));
    }

    #[test]
    fn duplicate_edges_are_deduplicated() {
        let mut b = Workflow::builder("w1", "v1");
        b = b.then("a", Action::default_action(), "b");
        b = b.then("a", Action::default_action(), "b");
        let wf = b.build().unwrap();
        assert_eq!(wf.steps["a"].successors[&Action::default_action()], vec![SmolStr::new("b")]);
    }

    #[test]
    fn declarative_dependency_implies_edge() {
        let mut b = Workflow::builder("w1", "v1");
        b.step("add");
        b.step("multiply").depends_on("value", "add");
        let wf = b.build().unwrap();
        assert!(wf.steps["add"].successors[&Action::default_action()].contains(&SmolStr::new("multiply")));
    }

    #[test]
    fn unknown_output_is_rejected() {
        let err = Workflow::builder("w1", "v1").then("a", Action::default_action(), "b").outputs(["z"]).build().unwrap_err();
        assert!(matches!(err, GraphConstructionError::UnknownOutput(_)));
    }

    /// Independent cycle detector over a plain edge list, used as an oracle
    /// against `WorkflowBuilder::build` in `acyclicity_matches_a_reference_dfs`.
    fn has_cycle(edges: &[(char, char)]) -> bool {
        use std::collections::{HashMap, HashSet};
        let mut adj: HashMap<char, Vec<char>> = HashMap::new();
        for &(from, to) in edges {
            adj.entry(from).or_default().push(to);
        }
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }
        fn visit(node: char, adj: &HashMap<char, Vec<char>>, marks: &mut HashMap<char, Mark>) -> bool {
            match marks.get(&node) {
                Some(Mark::Done) => return false,
                Some(Mark::InProgress) => return true,
                _ => {}
            }
            marks.insert(node, Mark::InProgress);
            if let Some(targets) = adj.get(&node) {
                for &t in targets {
                    if visit(t, adj, marks) {
                        return true;
                    }
                }
            }
            marks.insert(node, Mark::Done);
            false
        }
        let mut marks = HashMap::new();
        let nodes: HashSet<char> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();
        nodes.into_iter().any(|n| visit(n, &adj, &mut marks))
    }

    proptest::proptest! {
        /// For any edge list over a small alphabet, `WorkflowBuilder::build`
        /// rejects the graph (`GraphConstructionError::Cycle`) if and only if
        /// a reference DFS over the same edges finds one.
        #[test]
        fn acyclicity_matches_a_reference_dfs(
            edges in proptest::collection::vec(
                (proptest::sample::select(vec!['a', 'b', 'c', 'd', 'e']),
                 proptest::sample::select(vec!['a', 'b', 'c', 'd', 'e'])),
                0..12,
            )
        ) {
            let mut builder = Workflow::builder("w", "v1");
            for &(from, to) in &edges {
                if from != to {
                    builder = builder.then(&from.to_string(), Action::default_action(), &to.to_string());
                }
            }
            let filtered: Vec<(char, char)> = edges.into_iter().filter(|&(a, b)| a != b).collect();
            let built = builder.build();
            proptest::prop_assert_eq!(built.is_err(), has_cycle(&filtered));
        }
    }
}
