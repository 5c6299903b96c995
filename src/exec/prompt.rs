// src/exec/prompt.rs

//! Prompt construction for the developer agent.

use std::fmt::Write;

use crate::types::Task;

use super::backend::ExecutionContext;

/// Built-in system prompt. `generator.system_prompt` overrides it.
pub const SYSTEM_PROMPT: &str = "\
You are a senior full-stack software developer producing production-grade code.

Expertise: backend services (Python, Node.js, Go, Java), frontend frameworks,
relational and document databases, containers and CI/CD, API design, security
and performance work.

Standards for every answer:
- Complete, working code. No pseudocode or elided sections.
- Input validation, error handling and logging where they belong.
- Tests for the behaviour you implement.
- Configuration and dependency lists needed to run the code.

The task description contains a PROJECT CONTEXT section. Stay consistent with
the project's stack and with the tasks listed as dependencies or recently
completed.";

/// Return a copy of `task` whose description carries the plan context.
///
/// Without a plan context the task is returned unchanged.
pub fn enrich(task: &Task, context: &ExecutionContext) -> Task {
    let Some(plan) = &context.plan else {
        return task.clone();
    };

    let mut block = String::new();
    let _ = writeln!(block, "\n\n=== PROJECT CONTEXT ===");
    let _ = writeln!(block, "Project: {}", plan.title);
    let _ = writeln!(block, "Description: {}", plan.description);
    let _ = writeln!(block, "Current Task: {} of {}", context.position, context.total);

    let _ = writeln!(block, "\n=== TASK DEPENDENCIES ===");
    if context.dependencies.is_empty() {
        let _ = writeln!(block, "This task has no dependencies.");
    } else {
        let ids: Vec<&str> = context.dependencies.iter().map(|d| d.id.as_str()).collect();
        let _ = writeln!(block, "This task depends on: {}", ids.join(", "));
        for dep in &context.dependencies {
            if let Some(title) = &dep.title {
                let _ = writeln!(block, "- {}: {}", dep.id, title);
            }
        }
    }

    if !context.recently_completed.is_empty() {
        let _ = writeln!(block, "\n=== COMPLETED TASKS ===");
        for done in &context.recently_completed {
            if let Some(title) = &done.title {
                let _ = writeln!(block, "- {}: {}", done.id, title);
            }
        }
    }

    let mut enriched = task.clone();
    enriched.description.push_str(&block);
    enriched
}

fn or_unspecified<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unspecified".to_string())
}

/// User prompt for one (already enriched) task.
pub fn construct_user_prompt(task: &Task) -> String {
    let dependencies = if task.dependencies.is_empty() {
        "none".to_string()
    } else {
        task.dependencies.join(", ")
    };

    format!(
        "\
## Task Details
**Title**: {title}
**Description**: {description}
**Estimated Hours**: {hours}
**Complexity**: {complexity}
**Dependencies**: {dependencies}

## Requirements
1. Provide a complete implementation that can be deployed as is, including
   configuration and the dependencies it needs.
2. Keep the design clean and consistent with the existing project.
3. Validate input, handle errors and log meaningfully.
4. Mind performance: caching, efficient queries, async IO where it helps.
5. Build on the dependencies and completed tasks listed in the project context.
",
        title = task.title,
        description = task.description,
        hours = or_unspecified(&task.estimated_hours),
        complexity = or_unspecified(&task.complexity),
    )
}
