use std::collections::HashSet;

use crate::error::{Result, ZkappError};
use crate::field::FieldElement;

use super::circuit::{Constraint, MethodCircuit, Node, Relation, Var};

/// Recorder handed to a method body while its circuit is declared.
///
/// Values are symbolic: a body cannot branch on them, only combine them,
/// assert over them and write them to slots. Every state read must be a
/// direct operand of an assertion before any write that depends on it.
pub struct MethodContext<'a> {
    contract: &'a str,
    method: &'a str,
    slots: &'a [String],
    params: usize,
    nodes: Vec<Node>,
    constraints: Vec<Constraint>,
    writes: Vec<(usize, Var)>,
    reads: Vec<Var>,
    constrained: HashSet<Var>,
}

impl<'a> MethodContext<'a> {
    pub(crate) fn new(contract: &'a str, method: &'a str, slots: &'a [String], params: usize) -> Self {
        Self {
            contract,
            method,
            slots,
            params,
            nodes: Vec::new(),
            constraints: Vec::new(),
            writes: Vec::new(),
            reads: Vec::new(),
            constrained: HashSet::new(),
        }
    }

    /// Create one argument node per declared parameter.
    pub(crate) fn arguments(&mut self) -> Vec<Var> {
        (0..self.params)
            .map(|index| self.push(Node::Arg { index }))
            .collect()
    }

    /// Read the current value of a declared slot.
    pub fn get(&mut self, slot: &str) -> Result<Var> {
        let index = self.slot_index(slot, "reads")?;
        let var = self.push(Node::State { slot: index });
        self.reads.push(var);
        Ok(var)
    }

    pub fn constant(&mut self, value: impl Into<FieldElement>) -> Var {
        self.push(Node::Const {
            value: value.into(),
        })
    }

    pub fn add(&mut self, lhs: Var, rhs: Var) -> Var {
        self.push(Node::Add { lhs, rhs })
    }

    pub fn sub(&mut self, lhs: Var, rhs: Var) -> Var {
        self.push(Node::Sub { lhs, rhs })
    }

    pub fn mul(&mut self, lhs: Var, rhs: Var) -> Var {
        self.push(Node::Mul { lhs, rhs })
    }

    /// Record the obligation `lhs == rhs`.
    pub fn assert_equals(&mut self, lhs: Var, rhs: Var) -> Result<()> {
        self.assert(Relation::Equals, lhs, rhs)
    }

    /// Record the obligation `lhs > rhs` (canonical integer order).
    pub fn assert_gt(&mut self, lhs: Var, rhs: Var) -> Result<()> {
        self.assert(Relation::GreaterThan, lhs, rhs)
    }

    /// Write `value` to a declared slot.
    pub fn set(&mut self, slot: &str, value: Var) -> Result<()> {
        let index = self.slot_index(slot, "writes")?;
        self.check_var(value)?;
        if let Some(read) = self.unconstrained_read_in(value) {
            let read_slot = self.slot_name_of(read);
            return Err(self.error(format!(
                "writes '{slot}' from an unconstrained read of '{read_slot}'"
            )));
        }
        self.writes.push((index, value));
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<MethodCircuit> {
        if let Some(read) = self
            .reads
            .iter()
            .find(|read| !self.constrained.contains(read))
        {
            return Err(self.error(format!(
                "reads slot '{}' without constraining it",
                self.slot_name_of(*read)
            )));
        }
        Ok(MethodCircuit {
            name: self.method.to_string(),
            params: self.params,
            slots: self.slots.to_vec(),
            nodes: self.nodes,
            constraints: self.constraints,
            writes: self.writes,
        })
    }

    fn assert(&mut self, relation: Relation, lhs: Var, rhs: Var) -> Result<()> {
        self.check_var(lhs)?;
        self.check_var(rhs)?;
        for var in [lhs, rhs] {
            if matches!(self.nodes[var.0], Node::State { .. }) {
                self.constrained.insert(var);
            }
        }
        self.constraints.push(Constraint { relation, lhs, rhs });
        Ok(())
    }

    fn push(&mut self, node: Node) -> Var {
        self.nodes.push(node);
        Var(self.nodes.len() - 1)
    }

    fn check_var(&self, var: Var) -> Result<()> {
        if var.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(self.error(format!("value {} does not belong to this method", var.0)))
        }
    }

    /// First state read in the dependency cone of `var` that no assertion covers yet.
    fn unconstrained_read_in(&self, var: Var) -> Option<Var> {
        let mut stack = vec![var];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            match self.nodes.get(current.0)? {
                Node::State { .. } if !self.constrained.contains(&current) => return Some(current),
                Node::Add { lhs, rhs } | Node::Sub { lhs, rhs } | Node::Mul { lhs, rhs } => {
                    stack.push(*lhs);
                    stack.push(*rhs);
                }
                _ => {}
            }
        }
        None
    }

    fn slot_index(&self, slot: &str, action: &str) -> Result<usize> {
        self.slots
            .iter()
            .position(|name| name == slot)
            .ok_or_else(|| self.error(format!("{action} undeclared slot '{slot}'")))
    }

    fn slot_name_of(&self, var: Var) -> String {
        match self.nodes.get(var.0) {
            Some(Node::State { slot }) => self.slots[*slot].clone(),
            _ => format!("<node {}>", var.0),
        }
    }

    fn error(&self, reason: String) -> ZkappError {
        ZkappError::declaration(self.contract, format!("method '{}' {reason}", self.method))
    }
}
