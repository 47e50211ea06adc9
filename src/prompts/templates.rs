//! The closed template set.
//!
//! Template bodies use `{variable}` placeholders. Output schemas are
//! declared separately so a custom body override can never change the
//! shape the gateway expects back.

/// A prompt template definition.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    /// System instructions sent alongside the rendered body.
    pub system: &'static str,
    /// User-content template with `{variable}` placeholders.
    pub body: &'static str,
    /// Variables that must be supplied.
    pub required: &'static [&'static str],
    /// Variables that may be supplied.
    pub optional: &'static [&'static str],
    /// Declared JSON output shape, embedded into the request by the
    /// gateway and preserved across custom overrides.
    pub schema: &'static str,
}

pub const CLASSIFIER: Template = Template {
    name: "classifier",
    system: "You are an email triage engine. Classify the email into exactly one of: \
             required_personal_action, team_action, optional_action, job_listing, \
             optional_event, work_relevant, fyi, newsletter, spam_to_delete. \
             Use the recipient's role and rules to judge relevance.",
    body: "Recipient: {username} <{recipient}>\n\
           Role context: {job_role_context}\n\
           Classification rules: {classification_rules}\n\
           {few_shot_examples}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Email body:\n{body}",
    required: &[
        "subject",
        "sender",
        "recipient",
        "body",
        "job_role_context",
        "classification_rules",
        "username",
    ],
    optional: &["few_shot_examples"],
    schema: r#"{"category": "<one of the nine categories>", "confidence": 0.0}"#,
};

pub const CLASSIFIER_WITH_EXPLANATION: Template = Template {
    name: "classifier_with_explanation",
    system: "You are an email triage engine. Classify the email into exactly one of: \
             required_personal_action, team_action, optional_action, job_listing, \
             optional_event, work_relevant, fyi, newsletter, spam_to_delete. \
             Explain your reasoning briefly and give a one-line summary a busy \
             person can scan. Confidence must reflect genuine certainty.",
    body: "Recipient: {username} <{recipient}>\n\
           Role context: {job_role_context}\n\
           Classification rules: {classification_rules}\n\
           {few_shot_examples}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Email body:\n{body}",
    required: &[
        "subject",
        "sender",
        "recipient",
        "body",
        "job_role_context",
        "classification_rules",
        "username",
    ],
    optional: &["few_shot_examples"],
    schema: r#"{"category": "<one of the nine categories>", "confidence": 0.0, "reasoning": "...", "one_line_summary": "..."}"#,
};

pub const SUMMERIZE_ACTION_ITEM: Template = Template {
    name: "summerize_action_item",
    system: "You extract concrete action items from an email addressed to the \
             recipient. List each action as an imperative sentence. Capture any \
             stated deadline verbatim in due_date; omit it when none is stated.",
    body: "Recipient: {username}\n\
           Role context: {job_role_context}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Email body:\n{body}",
    required: &["subject", "sender", "body", "username", "job_role_context"],
    optional: &[],
    schema: r#"{"title": "...", "summary": "...", "action_items": ["..."], "due_date": "<verbatim deadline or omit>"}"#,
};

pub const JOB_LISTING_ANALYSIS: Template = Template {
    name: "job_listing_analysis",
    system: "You assess whether a job listing email matches the recipient's skills \
             and role. qualification_match is 0.0 (no fit) to 1.0 (strong fit).",
    body: "Role context: {job_role_context}\n\
           Skills: {job_skills}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Listing:\n{body}",
    required: &["subject", "sender", "body", "job_role_context", "job_skills"],
    optional: &[],
    schema: r#"{"title": "...", "summary": "...", "qualification_match": 0.0, "key_requirements": ["..."]}"#,
};

pub const EVENT_RELEVANCE: Template = Template {
    name: "event_relevance",
    system: "You assess how relevant an event invitation is to the recipient's role. \
             relevance_score is 0.0 (irrelevant) to 1.0 (must attend).",
    body: "Role context: {job_role_context}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Invitation:\n{body}",
    required: &["subject", "sender", "body", "job_role_context"],
    optional: &[],
    schema: r#"{"title": "...", "summary": "...", "relevance_score": 0.0}"#,
};

pub const NEWSLETTER_SUMMARY: Template = Template {
    name: "newsletter_summary",
    system: "You summarize a newsletter into its distinct items. Each key point is \
             one sentence covering one item.",
    body: "Subject: {subject}\n\
           From: {sender}\n\n\
           Newsletter body:\n{body}",
    required: &["subject", "sender", "body"],
    optional: &[],
    schema: r#"{"title": "...", "summary": "...", "key_points": ["..."]}"#,
};

pub const NEWSLETTER_SUMMARY_CUSTOM: Template = Template {
    name: "newsletter_summary_custom",
    system: "You summarize a newsletter, keeping ONLY items that match the reader's \
             stated interests. Discard everything else. Each key point is one \
             sentence covering one matching item.",
    body: "Reader interests: {custom_interests}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Newsletter body:\n{body}",
    required: &["subject", "sender", "body", "custom_interests"],
    optional: &[],
    schema: r#"{"title": "...", "summary": "...", "key_points": ["..."]}"#,
};

pub const FYI_SUMMARY: Template = Template {
    name: "fyi_summary",
    system: "You compress an informational email into a single bullet the recipient \
             can read in two seconds.",
    body: "Recipient: {username}\n\
           Subject: {subject}\n\
           From: {sender}\n\n\
           Email body:\n{body}",
    required: &["subject", "sender", "body", "username"],
    optional: &[],
    schema: r#"{"summary": "..."}"#,
};

pub const CONTENT_DEDUPLICATION: Template = Template {
    name: "content_deduplication",
    system: "You deduplicate a list of task summaries. Merge entries describing the \
             same underlying work; keep distinct work separate. Return the surviving \
             summaries.",
    body: "Task summaries, one per line:\n{items}",
    required: &["items"],
    optional: &[],
    schema: r#"{"deduplicated": ["..."]}"#,
};

pub const HOLISTIC_INBOX_ANALYSIS: Template = Template {
    name: "holistic_inbox_analysis",
    system: "You review one-line summaries of a triaged inbox and write a short \
             overview: themes, the most urgent threads, and anything that looks \
             like it is slipping.",
    body: "Recipient: {username}\n\
           Role context: {job_role_context}\n\n\
           Triaged summaries, one per line:\n{summaries}",
    required: &["summaries", "username", "job_role_context"],
    optional: &[],
    schema: r#"{"summary": "..."}"#,
};

/// Every template in the closed set.
pub const ALL: [Template; 10] = [
    CLASSIFIER,
    CLASSIFIER_WITH_EXPLANATION,
    SUMMERIZE_ACTION_ITEM,
    JOB_LISTING_ANALYSIS,
    EVENT_RELEVANCE,
    NEWSLETTER_SUMMARY,
    NEWSLETTER_SUMMARY_CUSTOM,
    FYI_SUMMARY,
    CONTENT_DEDUPLICATION,
    HOLISTIC_INBOX_ANALYSIS,
];
