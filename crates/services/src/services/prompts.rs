//! Prompt templates for the AI features. Each builder returns a system
//! instruction describing the task and output contract, plus a user
//! instruction carrying the domain data.

use std::fmt::Write;

use db::models::{comment::CommentWithAuthor, issue::Issue, label::Label};

pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn description_or_placeholder(description: Option<&str>) -> &str {
    match description {
        Some(text) if !text.trim().is_empty() => text,
        _ => "(no description)",
    }
}

pub fn issue_summary(issue: &Issue, comments: &[CommentWithAuthor]) -> Prompt {
    let system = "You are a project management assistant. Summarize the core of the issue concisely.\n\
Follow this structure:\n\
- Core content: a 2-3 sentence summary\n\
- Key discussion points: the important points from the comments (if any)\n\
- Next steps: action items (where they can be identified)"
        .to_string();

    let mut user = format!(
        "Summarize the following issue:\n\n\
Title: {}\n\n\
Description:\n{}\n",
        issue.title,
        description_or_placeholder(issue.description.as_deref()),
    );

    if !comments.is_empty() {
        let _ = write!(user, "\nComments ({}):\n", comments.len());
        for comment in comments {
            let _ = writeln!(user, "- {}: {}", comment.author_name, comment.content);
        }
    }

    Prompt { system, user }
}

pub fn action_suggestion(issue: &Issue, status_name: &str) -> Prompt {
    let system = r#"You are a project management expert. Analyze the issue's current state and suggest the concrete actions to take next.

Respond in JSON:
{
  "suggestions": [
    {
      "action": "the suggested action",
      "reason": "why",
      "priority": "high" | "medium" | "low"
    }
  ],
  "blockers": ["blockers or concerns you identified"],
  "estimatedEffort": "estimated time/effort"
}"#
    .to_string();

    let user = format!(
        "Suggest the next actions for this issue:\n\n\
Title: {}\n\
Status: {}\n\
Priority: {}\n\n\
Description:\n{}\n",
        issue.title,
        status_name,
        issue.priority,
        description_or_placeholder(issue.description.as_deref()),
    );

    Prompt { system, user }
}

pub fn label_suggestion(issue: &Issue, labels: &[Label]) -> Prompt {
    let system = r#"You are an issue triage expert. Analyze the issue's content and recommend appropriate labels.

Only use labels from the provided list. Do not invent new labels.

Respond in JSON:
{
  "suggestedLabels": [
    {
      "id": "label id",
      "name": "label name",
      "confidence": confidence between 0.0 and 1.0
    }
  ],
  "reasoning": "why these labels"
}"#
    .to_string();

    let mut user = format!(
        "Recommend labels for the following issue:\n\n\
Title: {}\n\n\
Description:\n{}\n\n\
Available labels:\n",
        issue.title,
        description_or_placeholder(issue.description.as_deref()),
    );
    for label in labels {
        let _ = writeln!(user, "- {} (ID: {})", label.name, label.id);
    }

    Prompt { system, user }
}

pub fn duplicate_detection(
    title: &str,
    description: Option<&str>,
    existing_issues: &[Issue],
) -> Prompt {
    let system = r#"You are a duplicate-issue detection expert. Determine whether the new issue duplicates any of the existing ones.

Only include candidates with a similarity of 0.7 or higher.

Respond in JSON:
{
  "duplicates": [
    {
      "id": "existing issue id",
      "title": "existing issue title",
      "similarity": similarity between 0.0 and 1.0,
      "reason": "why they are similar"
    }
  ],
  "isLikelyDuplicate": true | false,
  "recommendation": "recommended course of action"
}"#
    .to_string();

    let mut user = format!(
        "Check whether this new issue duplicates any existing issue:\n\n\
New issue:\n\
Title: {}\n\
Description: {}\n\n\
Existing issues:\n",
        title,
        description_or_placeholder(description),
    );
    for issue in existing_issues {
        let _ = writeln!(
            user,
            "---\nID: {}\nTitle: {}\nDescription: {}",
            issue.id,
            issue.title,
            description_or_placeholder(issue.description.as_deref()),
        );
    }

    Prompt { system, user }
}

pub fn comment_summary(comments: &[CommentWithAuthor]) -> Prompt {
    let system = r#"You are a discussion summarization expert. Analyze the issue's comments and summarize the essentials.

Respond in JSON:
{
  "summary": "overall discussion summary (2-3 sentences)",
  "keyPoints": ["the main discussion points"],
  "decisions": ["what was decided"],
  "openQuestions": ["questions still unresolved"],
  "participants": ["the most active participants"]
}"#
    .to_string();

    let mut user = "Summarize the following comments:\n\n".to_string();
    for (i, comment) in comments.iter().enumerate() {
        if i > 0 {
            user.push_str("\n---\n");
        }
        let _ = writeln!(
            user,
            "[{}] {}:\n{}",
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.author_name,
            comment.content
        );
    }

    Prompt { system, user }
}
