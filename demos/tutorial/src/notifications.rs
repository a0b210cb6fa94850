use std::sync::{Arc, Mutex, OnceLock};

use depwire_di::{Arguments, BackgroundTasks, Dependable, DynError, Extractor, Requirement};

/// Where background tasks write their log lines
#[derive(Debug, Default)]
pub struct NotificationLog {
    lines: Mutex<Vec<String>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_log(&self, message: String) {
        tracing::info!("{}", message.trim_end());
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    pub fn contents(&self) -> String {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .concat()
    }
}

/// Schedules a log write for the `q` query parameter, if there is one
pub fn get_query() -> Dependable {
    static GET_QUERY: OnceLock<Dependable> = OnceLock::new();
    GET_QUERY
        .get_or_init(|| {
            Dependable::plain("get_query", |args: Arguments| async move {
                let background_tasks = args.get::<BackgroundTasks>("background_tasks")?;
                let q = args.cloned_optional::<String>("q")?;
                if let Some(q) = &q {
                    let log = args.get::<NotificationLog>("log")?;
                    let message = format!("found query: {q}\n");
                    background_tasks.add_task(write_log(log, message));
                }
                Ok::<_, DynError>(q)
            })
            .requires(Requirement::background_tasks("background_tasks"))
            .requires(Extractor::query::<String>("q").optional())
            .requires(Requirement::state::<NotificationLog>("log"))
            .build()
        })
        .clone()
}

pub async fn write_log(log: Arc<NotificationLog>, message: String) {
    log.write_log(message)
}
