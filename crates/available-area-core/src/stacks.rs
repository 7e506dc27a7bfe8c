use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ActionWithArea, AreaError, CompatibilityCheck, Stack};

pub const NO_EXISTING_ACTIONS: &str = "No existing actions so no stacks are needed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackResult {
    pub stacks: Vec<Stack>,
    pub explanations: Vec<String>,
}

/// Decode the action list handed over at a JSON boundary.
///
/// # Errors
/// Returns [`AreaError::InvalidInput`] when `value` is not an array or any entry
/// is not a `{ code, area }` object.
pub fn actions_from_json(value: &Value) -> Result<Vec<ActionWithArea>, AreaError> {
    let Value::Array(entries) = value else {
        return Err(AreaError::InvalidInput("actions MUST be an array".to_string()));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            ActionWithArea::deserialize(entry).map_err(|err| {
                AreaError::InvalidInput(format!("actions[{index}] is not a valid action: {err}"))
            })
        })
        .collect()
}

/// Partition the area of `actions` into stacks of mutually compatible actions.
///
/// Actions are placed smallest first. Each action joins every earlier stack it
/// is compatible with while it still has area left, splitting the first stack
/// wider than its remaining area and stopping there. Whatever area is left
/// afterwards becomes a new stack of its own.
///
/// # Errors
/// Returns [`AreaError`] when any action has a blank code or an area that is
/// negative or not finite.
pub fn create_action_stacks<C>(
    actions: &[ActionWithArea],
    compatibility: &C,
) -> Result<StackResult, AreaError>
where
    C: CompatibilityCheck + ?Sized,
{
    for action in actions {
        action.validate()?;
    }

    if actions.is_empty() {
        return Ok(StackResult {
            stacks: Vec::new(),
            explanations: vec![NO_EXISTING_ACTIONS.to_string()],
        });
    }

    let mut sorted = actions.to_vec();
    sorted.sort_by(|lhs, rhs| lhs.area.partial_cmp(&rhs.area).unwrap_or(Ordering::Equal));

    let mut builder = StackBuilder::default();
    for action in &sorted {
        builder.place(action, compatibility);
    }
    Ok(builder.finish())
}

#[derive(Debug, Default)]
struct StackBuilder {
    stacks: Vec<Stack>,
    explanations: Vec<String>,
    last_stack_number: u32,
}

impl StackBuilder {
    fn next_stack_number(&mut self) -> u32 {
        self.last_stack_number += 1;
        self.last_stack_number
    }

    fn place<C>(&mut self, action: &ActionWithArea, compatibility: &C)
    where
        C: CompatibilityCheck + ?Sized,
    {
        let code = &action.code;
        let mut remaining_area = action.area;
        let mut joined_any = false;
        self.explanations.push(format!("Adding {code} (area {})", action.area));

        // Stacks created during this turn are never revisited by the same action.
        let stacks_at_start = self.stacks.len();
        for index in 0..stacks_at_start {
            let stack_number = self.stacks[index].stack_number;
            let stack_area = self.stacks[index].area;
            let (compatible, incompatible) =
                partition_by_compatibility(code, &self.stacks[index].action_codes, compatibility);

            if !compatible.is_empty() {
                self.explanations.push(format!(
                    "  {code} is compatible with: {} in Stack {stack_number}",
                    compatible.join(", ")
                ));
            }
            if !incompatible.is_empty() {
                self.explanations.push(format!(
                    "  {code} is not compatible with: {} in Stack {stack_number}",
                    incompatible.join(", ")
                ));
                continue;
            }

            joined_any = true;
            if remaining_area >= stack_area {
                self.stacks[index].action_codes.push(code.clone());
                remaining_area -= stack_area;
                self.explanations.push(format!(
                    "  Added {code} to Stack {stack_number} (area {stack_area}), remaining area {remaining_area}"
                ));
                continue;
            }

            let split_number = self.next_stack_number();
            let split_area = stack_area - remaining_area;
            let split_off =
                Stack::new(split_number, self.stacks[index].action_codes.clone(), split_area);
            self.explanations.push(format!(
                "  Split Stack {stack_number} (area {stack_area}): added {code} to Stack {stack_number} with area {remaining_area}, created Stack {split_number} for {} with area {split_area}",
                split_off.action_codes.join(", ")
            ));

            let stack = &mut self.stacks[index];
            stack.area = remaining_area;
            stack.action_codes.push(code.clone());
            self.stacks.push(split_off);
            remaining_area = 0.0;
            break;
        }

        if remaining_area > 0.0 || !joined_any {
            let stack_number = self.next_stack_number();
            self.explanations.push(format!(
                "  Created Stack {stack_number} for {code} with area {remaining_area}"
            ));
            self.stacks.push(Stack::new(stack_number, vec![code.clone()], remaining_area));
        }
    }

    fn finish(self) -> StackResult {
        StackResult { stacks: self.stacks, explanations: self.explanations }
    }
}

fn partition_by_compatibility<'a, C>(
    code: &str,
    stack_codes: &'a [String],
    compatibility: &C,
) -> (Vec<&'a str>, Vec<&'a str>)
where
    C: CompatibilityCheck + ?Sized,
{
    stack_codes
        .iter()
        .map(String::as_str)
        .partition(|other| compatibility.is_compatible(code, other))
}
