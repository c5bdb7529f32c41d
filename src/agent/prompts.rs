//! Prompt templates for the planner and the executor.

/// Shared system prompt describing the agent's working environment.
pub const SYSTEM_PROMPT: &str = "\
You are an autonomous general-purpose agent. You break a user's goal into steps and \
carry them out with the tools you are given.

<working_rules>
- Reply in the language the user writes in unless asked otherwise.
- Use exactly one tool per reply; wait for its result before deciding the next action.
- Prefer tools over guessing. When information is missing and no tool can find it, ask \
the user with message_ask_user.
- Keep the user informed about meaningful progress with message_notify_user.
- Refer to files by absolute path.
</working_rules>";

/// System prompt appended for the planner.
pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are a task planner. You turn a user's request into a short, ordered plan of concrete \
steps and revise the plan as steps complete. You never execute steps yourself.";

/// System prompt appended for the executor.
pub const REACT_SYSTEM_PROMPT: &str = "\
You are a task executor. You complete one plan step at a time using tools, and report the \
outcome of that step as JSON when it is done.";

/// Request for a final summary of the whole task.
pub const SUMMARIZE_PROMPT: &str = "\
The task is finished. Summarize for the user what was done and what the results are. \
List every file produced for the user.

Return JSON only, in this shape:
{
  \"message\": \"summary for the user\",
  \"attachments\": [\"/absolute/path/to/file\"]
}";

pub fn planner_system_prompt() -> String {
    format!("{SYSTEM_PROMPT}\n\n{PLANNER_SYSTEM_PROMPT}")
}

pub fn react_system_prompt() -> String {
    format!("{SYSTEM_PROMPT}\n\n{REACT_SYSTEM_PROMPT}")
}

fn attachment_list(attachments: &[String]) -> String {
    if attachments.is_empty() {
        "(none)".to_string()
    } else {
        attachments.join("\n")
    }
}

/// Ask the planner for a fresh plan.
pub fn create_plan(message: &str, attachments: &[String]) -> String {
    format!(
        "Create a plan for the user's request.

Return JSON only, in this shape:
{{
  \"message\": \"short reply to the user acknowledging the request\",
  \"language\": \"language the user wrote in, e.g. en\",
  \"title\": \"short task title\",
  \"goal\": \"one sentence goal\",
  \"steps\": [
    {{\"id\": \"1\", \"description\": \"what to do in this step\"}}
  ]
}}

Keep the plan small: each step must be achievable with a few tool calls. An empty \
`steps` list means the request needs no work.

User request:
{message}

Attachments:
{attachments}",
        attachments = attachment_list(attachments),
    )
}

/// Ask the planner to revise the unfinished part of `plan` after `step`.
pub fn update_plan(plan_json: &str, step_json: &str) -> String {
    format!(
        "A step has just finished. Revise the remaining, unfinished steps of the plan.

Rules:
- Return only the steps that still need to run; completed steps are kept automatically.
- Drop steps that are no longer needed and add steps if the result revealed new work.
- Return an empty list when the goal is already reached.

Return JSON only, in this shape:
{{
  \"steps\": [
    {{\"id\": \"...\", \"description\": \"...\"}}
  ]
}}

Current plan:
{plan_json}

Finished step:
{step_json}"
    )
}

/// Ask the executor to run a single step.
pub fn execute_step(message: &str, attachments: &[String], language: &str, step: &str) -> String {
    let language = if language.is_empty() { "the user's language" } else { language };
    format!(
        "Complete the current step of the plan.

Rules:
- Work only on the current step, then stop.
- Use message_ask_user when you need the user's input and message_notify_user to share progress.
- Write user-facing text in {language}.

When the step is done, return JSON only, in this shape:
{{
  \"success\": true,
  \"result\": \"what this step achieved\",
  \"attachments\": [\"/absolute/path/to/file\"]
}}

User message:
{message}

Attachments:
{attachments}

Current step:
{step}",
        attachments = attachment_list(attachments),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_embed_inputs() {
        let prompt = create_plan("book a table", &["/tmp/menu.pdf".to_string()]);
        assert!(prompt.contains("book a table"));
        assert!(prompt.contains("/tmp/menu.pdf"));

        let prompt = execute_step("hi", &[], "", "call the restaurant");
        assert!(prompt.contains("call the restaurant"));
        assert!(prompt.contains("the user's language"));
        assert!(prompt.contains("(none)"));
    }
}
