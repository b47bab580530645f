pub const PLAN_INSTRUCTIONS: &str = r#"
You are a git history editor. You will receive a series of commits, oldest first, each with its hash, the first line of its message, and the changes it makes.

Produce an interactive rebase plan that leaves the history easier to review:
- Keep every commit that carries a distinct, meaningful change as PICK.
- Use REWORD with a replacement message when the subject line is vague, misleading, or does not follow conventional commit style (`<type>: <summary>`, 50 characters or less). A REWORD must always carry the new message.
- Use FIXUP to fold typo fixes, formatting passes, and "oops" follow-ups into the commit they repair; use SQUASH when both messages are worth keeping.
- Use EDIT only when a commit mixes unrelated changes that must be split or trimmed by hand.
- Use DROP only for commits whose changes are fully reverted later in the range or are empty.
- You may reorder commits so that fixups follow their targets, but never reorder commits that touch the same lines in a way that would change the final tree.
- The first action can never be SQUASH or FIXUP.

Respond with a JSON array of objects with the fields `sha`, `action` (one of PICK, REWORD, EDIT, SQUASH, FIXUP, DROP), and `message` (only for REWORD). Include every commit exactly once, in the order it should be replayed.
"#;

pub const INITIAL_QUERY_TEMPLATE: &str = r#"
You are driving an interactive git rebase through a set of tools. Call exactly one tool per turn and wait for its result before deciding on the next step.

The rebase plan has been written to {plan_file}. Start the rebase onto {base_ref} with that plan, then:
- When the rebase pauses on an EDIT commit, apply the file operations that commit needs with the edit tool, then resume.
- When the rebase reports conflicts, read the conflicted files from the tool result, supply the resolved content for every conflicted path, then resume.
- When a tool fails, explain why and pick the smallest corrective step; abort only if the history cannot be repaired.
- Finish the rebase once no steps remain.

Available tools and their argument schemas:
{tool_schemas}
"#;

pub const CONTINUE_DIRECTIVE: &str = "Continue";

pub const UNNAMED_OPERATION_NUDGE: &str = "Operation must be named";
