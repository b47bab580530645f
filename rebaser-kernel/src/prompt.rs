use crate::history::CommitSummary;

pub const COMMIT_SEPARATOR: &str = "-------------------------";

#[derive(Debug, Clone, Default)]
pub struct PlanPromptOptions<'a> {
    /// Commits (full or abbreviated ids) whose hunks are elided to save prompt space.
    pub exclude_diff_for: &'a [String],
    /// Paths whose patches are always elided, e.g. lockfiles.
    pub elide_paths: &'a [String],
}

fn append_commit_block(prompt: &mut String, commit: &CommitSummary, options: &PlanPromptOptions) {
    let elide_commit = options
        .exclude_diff_for
        .iter()
        .any(|wanted| commit.is_named_by(wanted));

    prompt.push_str(&format!("Commit Hash: {}\n", commit.id));
    prompt.push_str(&format!("Commit Message: {}\n", commit.message.trim()));
    prompt.push_str(&format!("Diff: ({} files changed)\n", commit.diff.len()));

    for change in &commit.diff {
        let elide = elide_commit || options.elide_paths.iter().any(|path| path == &change.path);
        prompt.push_str(&change.render(elide));
        prompt.push('\n');
    }

    prompt.push_str(COMMIT_SEPARATOR);
}

/// Instructions followed by one block per commit, oldest first.
pub fn build_plan_prompt(
    history: &[CommitSummary],
    instructions: &str,
    options: &PlanPromptOptions,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(instructions.trim());

    for commit in history {
        prompt.push_str("\n\n");
        append_commit_block(&mut prompt, commit, options);
    }

    prompt
}

/// Fill the `{plan_file}`, `{base_ref}` and `{tool_schemas}` placeholders of the agent's first directive.
pub fn render_initial_query(
    template: &str,
    plan_file: &str,
    base_ref: &str,
    tool_schemas: &str,
) -> String {
    template
        .replace("{plan_file}", plan_file)
        .replace("{base_ref}", base_ref)
        .replace("{tool_schemas}", tool_schemas)
        .trim()
        .to_string()
}
