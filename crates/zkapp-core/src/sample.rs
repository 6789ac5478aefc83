//! `SimpleZkapp`: one slot `x`, deployed as `x = 1`, and `update(y)` which
//! adds a positive `y` to `x`.

use crate::contract::{ContractDefinition, MethodDecl, ParamType};
use crate::error::Result;
use crate::field::FieldElement;

pub const NAME: &str = "SimpleZkapp";
pub const INITIAL_X: u64 = 1;

pub fn simple_zkapp() -> Result<ContractDefinition> {
    let mut definition = ContractDefinition::new(NAME);
    definition.declare_state(&["x"])?;
    definition.declare_methods(vec![MethodDecl::new(
        "update",
        [ParamType::Field],
        |ctx, args| {
            let y = args[0];
            let x = ctx.get("x")?;
            ctx.assert_equals(x, x)?;
            let zero = ctx.constant(0u64);
            ctx.assert_gt(y, zero)?;
            let sum = ctx.add(x, y);
            ctx.set("x", sum)
        },
    )])?;
    Ok(definition)
}

pub fn initial_state() -> Vec<FieldElement> {
    vec![FieldElement::from(INITIAL_X)]
}

/// The value `update(y)` leaves in `x`.
pub fn expected_after_update(x: FieldElement, y: FieldElement) -> FieldElement {
    x.add(&y)
}
