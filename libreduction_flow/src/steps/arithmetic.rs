use super::{produced, unary, StepContext, WorkflowStep};
use crate::error::StepError;
use crate::identifier::Identifier;
use crate::operation::OperationCall;

/// Multiply by a constant factor
#[derive(Debug, Clone)]
pub struct Scale {
    pub suffix: String,
    pub factor: f64,
}

impl Scale {
    pub fn new(suffix: &str, factor: f64) -> Self {
        Self {
            suffix: suffix.to_string(),
            factor,
        }
    }
}

impl WorkflowStep for Scale {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Scale"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "Scale", &input, &self.suffix)
            .with_param("Factor", self.factor)
            .with_param("Operation", "Multiply");
        let outputs = ctx.execute(call)?;
        produced(&outputs, "Scale", "OutputWorkspace")
    }
}

fn binary(
    ctx: &mut StepContext,
    operation: &str,
    suffix: &str,
    lhs: &Identifier,
    rhs: &Identifier,
) -> Result<Identifier, StepError> {
    let call = OperationCall::new(operation)
        .with_input("LHSWorkspace", lhs)
        .with_input("RHSWorkspace", rhs)
        .with_output("OutputWorkspace", &ctx.names.with_suffix(suffix));
    let outputs = ctx.execute(call)?;
    produced(&outputs, operation, "OutputWorkspace")
}

/// `lhs - rhs`
#[derive(Debug, Clone)]
pub struct Minus {
    pub suffix: String,
}

impl WorkflowStep for Minus {
    type Input = (Identifier, Identifier);
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Minus"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (lhs, rhs): (Identifier, Identifier),
    ) -> Result<Identifier, StepError> {
        binary(ctx, "Minus", &self.suffix, &lhs, &rhs)
    }
}

/// `lhs + rhs`. Naming the output after lhs accumulates in place.
#[derive(Debug, Clone)]
pub struct Plus {
    pub suffix: String,
}

impl WorkflowStep for Plus {
    type Input = (Identifier, Identifier);
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "Plus"
    }

    fn apply(
        &self,
        ctx: &mut StepContext,
        (lhs, rhs): (Identifier, Identifier),
    ) -> Result<Identifier, StepError> {
        binary(ctx, "Plus", &self.suffix, &lhs, &rhs)
    }
}

#[derive(Debug, Clone)]
pub struct CloneWorkspace {
    pub suffix: String,
}

impl WorkflowStep for CloneWorkspace {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "CloneWorkspace"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = unary(ctx, "CloneWorkspace", &input, &self.suffix);
        let outputs = ctx.execute(call)?;
        produced(&outputs, "CloneWorkspace", "OutputWorkspace")
    }
}

/// Set a numeric sample log. Works in place and hands back its input.
#[derive(Debug, Clone)]
pub struct AddSampleLog {
    pub log_name: String,
    pub value: f64,
}

impl WorkflowStep for AddSampleLog {
    type Input = Identifier;
    type Output = Identifier;

    fn name(&self) -> &'static str {
        "AddSampleLog"
    }

    fn apply(&self, ctx: &mut StepContext, input: Identifier) -> Result<Identifier, StepError> {
        let call = OperationCall::new("AddSampleLog")
            .with_input("Workspace", &input)
            .with_param("LogName", self.log_name.as_str())
            .with_param("LogText", self.value.to_string())
            .with_param("LogType", "Number");
        ctx.execute(call)?;
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::steps::testing::Harness;
    use crate::workspace::MatrixWorkspace;

    #[test]
    fn test_steps_do_not_delete_inputs() {
        let mut harness = Harness::new()
            .with_workspace("a", MatrixWorkspace::single_valued(6.0))
            .with_workspace("b", MatrixWorkspace::single_valued(2.0));
        let (a, b) = (Identifier::new("a"), Identifier::new("b"));
        let difference = harness
            .apply(
                &Minus {
                    suffix: String::from("difference"),
                },
                (a.clone(), b.clone()),
            )
            .unwrap();
        let sum = harness
            .apply(
                &Plus {
                    suffix: String::from("sum"),
                },
                (a.clone(), b.clone()),
            )
            .unwrap();
        let scaled = harness.apply(&Scale::new("scaled", 0.5), sum.clone()).unwrap();
        assert_eq!(harness.registry.matrix(&difference).unwrap().value(), Some(4.0));
        assert_eq!(harness.registry.matrix(&scaled).unwrap().value(), Some(4.0));
        for id in [a, b, difference, sum] {
            assert!(harness.registry.exists(&id));
        }
    }

    #[test]
    fn test_add_sample_log_returns_its_input() {
        let mut harness = Harness::new().with_workspace("ws", MatrixWorkspace::single_valued(1.0));
        let id = Identifier::new("ws");
        let step = AddSampleLog {
            log_name: String::from("Ei"),
            value: 3.27,
        };
        let out = harness.apply(&step, id.clone()).unwrap();
        assert_eq!(out, id);
        assert_eq!(harness.registry.matrix(&id).unwrap().log_number("Ei"), Some(3.27));
    }

    #[test]
    fn test_plus_in_place_accumulates() {
        let mut harness = Harness::new().with_workspace("one", MatrixWorkspace::single_valued(1.0));
        let step = CloneWorkspace {
            suffix: String::from("sum"),
        };
        let sum = harness.apply(&step, Identifier::new("one")).unwrap();
        let plus = Plus {
            suffix: String::from("sum"),
        };
        let again = harness
            .apply(&plus, (sum.clone(), Identifier::new("one")))
            .unwrap();
        assert_eq!(again, sum);
        assert_eq!(harness.registry.matrix(&sum).unwrap().value(), Some(2.0));
    }
}
