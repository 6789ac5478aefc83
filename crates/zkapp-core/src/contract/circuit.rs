//! Constraint systems recorded from method bodies.
//!
//! A [`MethodCircuit`] is the symbolic trace of one method: an append-only list
//! of expression nodes, the assertions made over them and the slot writes.
//! Evaluating it against concrete arguments and a state snapshot yields the
//! preconditions and mutations an account update carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZkappError};
use crate::field::FieldElement;
use crate::transaction::{Mutation, Precondition};

/// Handle to a value inside a method trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Var(pub(crate) usize);

impl Var {
    /// Position of the node this handle refers to.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One expression in a method trace. Operands always refer to earlier nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Node {
    Arg { index: usize },
    State { slot: usize },
    Const { value: FieldElement },
    Add { lhs: Var, rhs: Var },
    Sub { lhs: Var, rhs: Var },
    Mul { lhs: Var, rhs: Var },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Equals,
    GreaterThan,
}

/// A recorded proof obligation `lhs <relation> rhs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub relation: Relation,
    pub lhs: Var,
    pub rhs: Var,
}

/// Compiled form of a single contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCircuit {
    pub name: String,
    pub params: usize,
    /// Slot names of the owning contract, in layout order.
    pub slots: Vec<String>,
    pub nodes: Vec<Node>,
    pub constraints: Vec<Constraint>,
    /// Slot writes in program order; the last write to a slot wins.
    pub writes: Vec<(usize, Var)>,
}

/// Concrete result of running a circuit on `(args, snapshot)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
    /// Descriptions of assertions that do not hold for these inputs.
    pub violations: Vec<String>,
}

impl Evaluation {
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }
}

impl MethodCircuit {
    /// Evaluate every node, then derive preconditions, mutations and violations.
    pub fn evaluate(&self, args: &[FieldElement], state: &[FieldElement]) -> Result<Evaluation> {
        if args.len() != self.params {
            return Err(self.invalid_call(format!(
                "declared with {} parameter(s), called with {}",
                self.params,
                args.len()
            )));
        }
        if state.len() != self.slots.len() {
            return Err(self.invalid_call(format!(
                "state snapshot has {} slot(s), contract declares {}",
                state.len(),
                self.slots.len()
            )));
        }

        let mut values: Vec<FieldElement> = Vec::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            let operand = |var: &Var| -> Result<FieldElement> {
                values.get(var.0).copied().filter(|_| var.0 < position).ok_or_else(|| {
                    ZkappError::Compilation(format!(
                        "method '{}': node {position} refers to node {}",
                        self.name, var.0
                    ))
                })
            };
            let out_of_range = || {
                ZkappError::Compilation(format!(
                    "method '{}': node {position} reads outside of the declared inputs",
                    self.name
                ))
            };
            let value = match node {
                Node::Arg { index } => *args.get(*index).ok_or_else(out_of_range)?,
                Node::State { slot } => *state.get(*slot).ok_or_else(out_of_range)?,
                Node::Const { value } => *value,
                Node::Add { lhs, rhs } => operand(lhs)?.add(&operand(rhs)?),
                Node::Sub { lhs, rhs } => operand(lhs)?.sub(&operand(rhs)?),
                Node::Mul { lhs, rhs } => operand(lhs)?.mul(&operand(rhs)?),
            };
            values.push(value);
        }
        let value_of = |var: Var| -> Result<FieldElement> {
            values.get(var.0).copied().ok_or_else(|| {
                ZkappError::Compilation(format!(
                    "method '{}': reference to missing node {}",
                    self.name, var.0
                ))
            })
        };

        let mut preconditions: Vec<Precondition> = Vec::new();
        let mut violations = Vec::new();
        for constraint in &self.constraints {
            let lhs = value_of(constraint.lhs)?;
            let rhs = value_of(constraint.rhs)?;
            let lhs_slot = self.state_slot(constraint.lhs);
            let rhs_slot = self.state_slot(constraint.rhs);

            let (holds, derived) = match constraint.relation {
                Relation::Equals => {
                    let mut derived = Vec::new();
                    if let Some(slot) = lhs_slot {
                        derived.push(Precondition::StateEquals { slot, value: rhs });
                    }
                    if let Some(slot) = rhs_slot {
                        derived.push(Precondition::StateEquals { slot, value: lhs });
                    }
                    (lhs == rhs, derived)
                }
                Relation::GreaterThan => {
                    let mut derived = Vec::new();
                    if let Some(slot) = lhs_slot {
                        derived.push(Precondition::StateGreaterThan { slot, bound: rhs });
                    }
                    if let Some(slot) = rhs_slot {
                        derived.push(Precondition::StateLessThan { slot, bound: lhs });
                    }
                    (lhs > rhs, derived)
                }
            };
            for precondition in derived {
                if !preconditions.contains(&precondition) {
                    preconditions.push(precondition);
                }
            }
            if !holds {
                violations.push(format!(
                    "{} (evaluated {lhs} {} {rhs})",
                    self.describe(constraint),
                    relation_symbol(constraint.relation)
                ));
            }
        }

        let mut final_writes: BTreeMap<usize, FieldElement> = BTreeMap::new();
        for (slot, var) in &self.writes {
            final_writes.insert(*slot, value_of(*var)?);
        }
        let mutations = final_writes
            .into_iter()
            .map(|(slot, value)| Mutation { slot, value })
            .collect();

        Ok(Evaluation {
            preconditions,
            mutations,
            violations,
        })
    }

    /// Human-readable form of a constraint, e.g. `x == arg0`.
    pub fn describe(&self, constraint: &Constraint) -> String {
        format!(
            "{} {} {}",
            self.render(constraint.lhs),
            relation_symbol(constraint.relation),
            self.render(constraint.rhs)
        )
    }

    fn render(&self, var: Var) -> String {
        match self.nodes.get(var.0) {
            Some(Node::Arg { index }) => format!("arg{index}"),
            Some(Node::State { slot }) => self
                .slots
                .get(*slot)
                .cloned()
                .unwrap_or_else(|| format!("slot{slot}")),
            Some(Node::Const { value }) => value.to_string(),
            Some(Node::Add { lhs, rhs }) => format!("({} + {})", self.render(*lhs), self.render(*rhs)),
            Some(Node::Sub { lhs, rhs }) => format!("({} - {})", self.render(*lhs), self.render(*rhs)),
            Some(Node::Mul { lhs, rhs }) => format!("({} * {})", self.render(*lhs), self.render(*rhs)),
            None => format!("<node {}>", var.0),
        }
    }

    fn state_slot(&self, var: Var) -> Option<usize> {
        match self.nodes.get(var.0) {
            Some(Node::State { slot }) => Some(*slot),
            _ => None,
        }
    }

    fn invalid_call(&self, reason: String) -> ZkappError {
        ZkappError::InvalidCall {
            method: self.name.clone(),
            reason,
        }
    }
}

fn relation_symbol(relation: Relation) -> &'static str {
    match relation {
        Relation::Equals => "==",
        Relation::GreaterThan => ">",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    /// `update(y)`: x = get(x); x == x; y > 0; set(x, x + y)
    fn update_circuit() -> MethodCircuit {
        MethodCircuit {
            name: "update".into(),
            params: 1,
            slots: vec!["x".into()],
            nodes: vec![
                Node::Arg { index: 0 },
                Node::State { slot: 0 },
                Node::Const { value: fe(0) },
                Node::Add {
                    lhs: Var(1),
                    rhs: Var(0),
                },
            ],
            constraints: vec![
                Constraint {
                    relation: Relation::Equals,
                    lhs: Var(1),
                    rhs: Var(1),
                },
                Constraint {
                    relation: Relation::GreaterThan,
                    lhs: Var(0),
                    rhs: Var(2),
                },
            ],
            writes: vec![(0, Var(3))],
        }
    }

    #[test]
    fn test_evaluate_sum_mutation_and_preconditions() {
        let eval = update_circuit().evaluate(&[fe(4)], &[fe(1)]).unwrap();
        assert!(eval.is_satisfied());
        assert_eq!(eval.mutations, vec![Mutation { slot: 0, value: fe(5) }]);
        // x == x collapses to a single precondition on the observed value
        assert_eq!(
            eval.preconditions,
            vec![Precondition::StateEquals { slot: 0, value: fe(1) }]
        );
    }

    #[test]
    fn test_evaluate_reports_violation() {
        let eval = update_circuit().evaluate(&[fe(0)], &[fe(1)]).unwrap();
        assert_eq!(eval.violations.len(), 1);
        assert!(eval.violations[0].starts_with("arg0 > 0"));
    }

    #[test]
    fn test_evaluate_rejects_wrong_arity_and_state_length() {
        let circuit = update_circuit();
        assert!(matches!(
            circuit.evaluate(&[], &[fe(1)]),
            Err(ZkappError::InvalidCall { .. })
        ));
        assert!(matches!(
            circuit.evaluate(&[fe(1)], &[]),
            Err(ZkappError::InvalidCall { .. })
        ));
    }

    #[test]
    fn test_greater_than_on_state_yields_bounds() {
        let circuit = MethodCircuit {
            name: "bounded".into(),
            params: 1,
            slots: vec!["x".into()],
            nodes: vec![Node::Arg { index: 0 }, Node::State { slot: 0 }],
            constraints: vec![
                Constraint {
                    relation: Relation::GreaterThan,
                    lhs: Var(1),
                    rhs: Var(0),
                },
                Constraint {
                    relation: Relation::GreaterThan,
                    lhs: Var(0),
                    rhs: Var(1),
                },
            ],
            writes: vec![],
        };
        let eval = circuit.evaluate(&[fe(3)], &[fe(7)]).unwrap();
        assert_eq!(
            eval.preconditions,
            vec![
                Precondition::StateGreaterThan { slot: 0, bound: fe(3) },
                Precondition::StateLessThan { slot: 0, bound: fe(3) },
            ]
        );
        assert_eq!(eval.violations.len(), 1);
    }

    #[test]
    fn test_forward_reference_is_compilation_error() {
        let mut circuit = update_circuit();
        circuit.nodes[3] = Node::Add {
            lhs: Var(3),
            rhs: Var(0),
        };
        assert!(matches!(
            circuit.evaluate(&[fe(1)], &[fe(1)]),
            Err(ZkappError::Compilation(_))
        ));
    }

    #[test]
    fn test_describe_renders_slot_names() {
        let circuit = update_circuit();
        assert_eq!(circuit.describe(&circuit.constraints[0]), "x == x");
    }
}
