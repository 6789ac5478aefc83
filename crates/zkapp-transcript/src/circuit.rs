use zkapp_core::backend::{PublicInputs, Witness};
use zkapp_core::contract::{MethodCircuit, Node, Var};

/// Reject circuits whose nodes reference later nodes or undeclared inputs.
pub fn check_well_formed(circuit: &MethodCircuit) -> Result<(), String> {
    for (position, node) in circuit.nodes.iter().enumerate() {
        let operands = match node {
            Node::Arg { index } if *index >= circuit.params => {
                return Err(format!("node {position} reads argument {index}"));
            }
            Node::State { slot } if *slot >= circuit.slots.len() => {
                return Err(format!("node {position} reads slot {slot}"));
            }
            Node::Add { lhs, rhs } | Node::Sub { lhs, rhs } | Node::Mul { lhs, rhs } => {
                vec![*lhs, *rhs]
            }
            _ => Vec::new(),
        };
        if let Some(forward) = operands
            .iter()
            .map(|var| var.index())
            .find(|index| *index >= position)
        {
            return Err(format!("node {position} refers forward to node {forward}"));
        }
    }
    let node_count = circuit.nodes.len();
    let dangling = circuit
        .constraints
        .iter()
        .flat_map(|c| [c.lhs, c.rhs])
        .chain(circuit.writes.iter().map(|(_, var)| *var))
        .map(Var::index)
        .find(|index| *index >= node_count);
    if let Some(index) = dangling {
        return Err(format!("reference to missing node {index}"));
    }
    if let Some((slot, _)) = circuit.writes.iter().find(|(slot, _)| *slot >= circuit.slots.len()) {
        return Err(format!("write to slot {slot} outside the state layout"));
    }
    Ok(())
}

/// Evaluate the circuit on the witness and require it to reproduce `inputs`.
pub fn check_witness(
    circuit: &MethodCircuit,
    witness: &Witness,
    inputs: &PublicInputs,
) -> Result<(), String> {
    if inputs.method != circuit.name {
        return Err(format!(
            "public inputs are for '{}', circuit is '{}'",
            inputs.method, circuit.name
        ));
    }
    let evaluation = circuit
        .evaluate(&witness.args, &witness.snapshot)
        .map_err(|err| err.to_string())?;
    if !evaluation.is_satisfied() {
        return Err(format!(
            "witness violates {}",
            evaluation.violations.join("; ")
        ));
    }
    if evaluation.preconditions != inputs.preconditions {
        return Err("witness does not produce the public preconditions".into());
    }
    if evaluation.mutations != inputs.mutations {
        return Err("witness does not produce the public mutations".into());
    }
    Ok(())
}
