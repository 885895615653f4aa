use chrono::NaiveDate;
use clap::{Args, Subcommand};

use kiwi_core::recurrence::parse_date;
use kiwi_core::task::{parse_tags, SortKey, DEFAULT_LIST_LIMIT};
use kiwi_core::{
    Clock, Config, Frequency, NewTask, Priority, RecurrenceRule, TaskFilter, TaskPatch,
    TaskStatus, TaskUpdate,
};

use crate::context::{print_json, with_retry, CmdResult, Context};

/// Recurrence flags shared by `create` and `update`.
#[derive(Args, Debug)]
pub struct RuleArgs {
    /// Repeat daily, weekly or monthly (makes the task a template)
    #[arg(long)]
    repeat: Option<Frequency>,
    /// Repeat every N periods
    #[arg(long)]
    every: Option<u32>,
    /// First occurrence date (YYYY-MM-DD, default: due date or today)
    #[arg(long, value_parser = parse_date)]
    anchor: Option<NaiveDate>,
    /// Last possible occurrence date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    until: Option<NaiveDate>,
}

impl RuleArgs {
    fn is_empty(&self) -> bool {
        self.repeat.is_none() && self.every.is_none() && self.anchor.is_none() && self.until.is_none()
    }

    /// Overlay the flags on an existing rule, or build a new one.
    fn resolve(
        self,
        base: Option<RecurrenceRule>,
        default_anchor: NaiveDate,
    ) -> Result<Option<RecurrenceRule>, Box<dyn std::error::Error>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut rule = match (base, self.repeat) {
            (Some(rule), _) => rule,
            (None, Some(frequency)) => RecurrenceRule::new(frequency, default_anchor),
            (None, None) => return Err("--repeat is required to make a task recurring".into()),
        };
        if let Some(frequency) = self.repeat {
            rule.frequency = frequency;
        }
        if let Some(every) = self.every {
            rule.interval = every;
        }
        if let Some(anchor) = self.anchor {
            rule.anchor_date = anchor;
        }
        if let Some(until) = self.until {
            rule.end_date = Some(until);
        }
        Ok(Some(rule))
    }
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task, or a recurring template with --repeat
    Create {
        /// Task title
        title: String,
        /// Task description
        #[arg(short, long)]
        description: Option<String>,
        /// Priority (low, normal, high)
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Parent task ID
        #[arg(long)]
        parent: Option<String>,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// List tasks
    List {
        /// Case-insensitive title search
        #[arg(short, long)]
        query: Option<String>,
        /// Filter by status (todo, doing, done, archived)
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Filter by priority
        #[arg(long)]
        priority: Option<Priority>,
        /// Comma-separated tags; matches any of them
        #[arg(long)]
        tags: Option<String>,
        /// Only children of this task
        #[arg(long)]
        parent: Option<String>,
        /// Only tasks without a parent
        #[arg(long)]
        top_level: bool,
        /// Only recurring templates
        #[arg(long)]
        templates: bool,
        /// Sort key, prefix with '-' for descending (e.g. -due_date)
        #[arg(long)]
        sort: Option<SortKey>,
        /// Maximum number of tasks (1-100)
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: u32,
        /// Number of tasks to skip
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show a task
    Get {
        /// Task ID
        id: String,
    },
    /// Update task fields
    Update {
        /// Task ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
        /// New priority
        #[arg(short, long)]
        priority: Option<Priority>,
        /// New status
        #[arg(long)]
        status: Option<TaskStatus>,
        /// New due date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
        /// Replace tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Mark a task done
    Complete {
        /// Task ID
        id: String,
    },
    /// Move a done task back to todo
    Reopen {
        /// Task ID
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
    /// Delete several tasks
    BulkDelete {
        /// Task IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List every tag in use
    Tags,
}

/// Level-ups and badges also go to the log, so they show up on stderr.
fn announce(update: &TaskUpdate) {
    for event in update.events.iter().filter(|e| e.is_milestone()) {
        tracing::info!(?event, "milestone reached");
    }
}

pub fn run(action: TaskAction, config: &Config) -> CmdResult {
    let ctx = Context::open(config)?;
    let engine = &ctx.engine;

    match action {
        TaskAction::Create {
            title,
            description,
            priority,
            due,
            tags,
            parent,
            rule,
        } => {
            let now = ctx.clock.now();
            let anchor = due.unwrap_or_else(|| ctx.clock.today());
            let new = NewTask {
                title,
                description,
                priority: priority.unwrap_or_default(),
                due_date: due,
                tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
                recurrence: rule.resolve(None, anchor)?,
                parent_task_id: parent,
            };
            let task = engine.create(new, now)?;
            print_json(&task)?;
        }
        TaskAction::List {
            query,
            status,
            priority,
            tags,
            parent,
            top_level,
            templates,
            sort,
            limit,
            offset,
        } => {
            let filter = TaskFilter {
                query,
                status,
                priority,
                tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
                parent_task_id: parent,
                top_level_only: top_level,
                templates_only: templates,
                sort: sort.unwrap_or_default(),
                limit,
                offset,
            };
            print_json(&engine.list(&filter)?)?;
        }
        TaskAction::Get { id } => {
            print_json(&engine.get(&id)?)?;
        }
        TaskAction::Update {
            id,
            title,
            description,
            priority,
            status,
            due,
            tags,
            rule,
        } => {
            let recurrence = if rule.is_empty() {
                None
            } else {
                let current = engine.get(&id)?;
                let anchor = due
                    .or(current.due_date)
                    .unwrap_or_else(|| ctx.clock.today());
                rule.resolve(current.recurrence, anchor)?
            };
            let patch = TaskPatch {
                title,
                description,
                priority,
                status,
                due_date: due,
                tags: tags.as_deref().map(parse_tags),
                recurrence,
            };
            let update = with_retry(|| engine.update(&id, patch.clone(), ctx.clock.now()))?;
            announce(&update);
            print_json(&update)?;
        }
        TaskAction::Complete { id } => {
            let update = with_retry(|| engine.complete(&id, ctx.clock.now()))?;
            announce(&update);
            print_json(&update)?;
        }
        TaskAction::Reopen { id } => {
            let update = with_retry(|| engine.reopen(&id, ctx.clock.now()))?;
            print_json(&update)?;
        }
        TaskAction::Delete { id } => {
            let deleted = with_retry(|| engine.delete(&id))?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))?;
        }
        TaskAction::BulkDelete { ids } => {
            let result = with_retry(|| engine.bulk_delete(&ids))?;
            print_json(&result)?;
        }
        TaskAction::Tags => {
            print_json(&engine.all_tags()?)?;
        }
    }
    Ok(())
}
