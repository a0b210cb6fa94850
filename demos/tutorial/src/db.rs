use std::{convert::Infallible, ops::Deref, sync::{Arc, OnceLock}};

use depwire_di::{Arguments, Dependable, DynError, Requirement};

use crate::store::Store;

/// An open session on the [Store], closed once the request is done
#[derive(Debug)]
pub struct DbSession {
    id: usize,
    label: &'static str,
    store: Arc<Store>,
    /// Sessions this one was opened from, kept open for as long as this one is
    parent: Option<Arc<DbSession>>,
}

impl DbSession {
    pub fn open(store: Arc<Store>, label: &'static str, parent: Option<Arc<DbSession>>) -> Self {
        let id = store.session_opened(label);
        tracing::debug!("Opened session {label}#{id}");
        DbSession {
            id,
            label,
            store,
            parent,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn parent(&self) -> Option<&DbSession> {
        self.parent.as_deref()
    }

    fn close(&self) {
        tracing::debug!("Closing session {}#{}", self.label, self.id);
        self.store.session_closed(self.label, self.id);
    }
}

impl Deref for DbSession {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn session(label: &'static str, parent: Option<&Dependable>) -> Dependable {
    let builder = Dependable::scoped(
        label,
        move |args: Arguments| async move {
            let store = args.get::<Store>("store")?;
            let parent = match args.names().any(|name| name == "parent") {
                true => Some(args.get::<DbSession>("parent")?),
                false => None,
            };
            Ok::<_, DynError>(DbSession::open(store, label, parent))
        },
        |session: Arc<DbSession>| async move {
            session.close();
            Ok::<_, Infallible>(())
        },
    )
    .requires(Requirement::state::<Store>("store"));

    match parent {
        Some(parent) => builder.requires(Requirement::depends("parent", parent)),
        None => builder,
    }
    .build()
}

/// One session per request on the application's [Store]
pub fn get_db() -> Dependable {
    static GET_DB: OnceLock<Dependable> = OnceLock::new();
    GET_DB.get_or_init(|| session("get_db", None)).clone()
}

pub fn dependency_a() -> Dependable {
    static DEPENDENCY_A: OnceLock<Dependable> = OnceLock::new();
    DEPENDENCY_A
        .get_or_init(|| session("dependency_a", None))
        .clone()
}

/// Needs the session of [dependency_a] open until its own is closed
pub fn dependency_b() -> Dependable {
    static DEPENDENCY_B: OnceLock<Dependable> = OnceLock::new();
    DEPENDENCY_B
        .get_or_init(|| session("dependency_b", Some(&dependency_a())))
        .clone()
}

pub fn dependency_c() -> Dependable {
    static DEPENDENCY_C: OnceLock<Dependable> = OnceLock::new();
    DEPENDENCY_C
        .get_or_init(|| session("dependency_c", Some(&dependency_b())))
        .clone()
}

#[cfg(test)]
mod tests {
    use depwire_di::{App, RequestParts, ResolutionContext};
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn nested_sessions_close_in_reverse() {
        let store = Arc::new(Store::new());
        let app = App::builder().add_shared_instance(store.clone()).build();
        let mut ctx = ResolutionContext::new(
            RequestParts::builder().build(),
            app.state().clone(),
            Default::default(),
        );

        let args = block_on(ctx.resolve(&[Requirement::depends("c", &dependency_c())])).unwrap();
        let c = args.get::<DbSession>("c").unwrap();
        assert_eq!(c.parent().and_then(|b| b.parent()).map(|a| a.id()), Some(1));

        ctx.enter_handler().unwrap();
        assert!(block_on(ctx.finish()).is_empty());

        assert_eq!(
            store.session_events(),
            vec![
                "open dependency_a#1",
                "open dependency_b#2",
                "open dependency_c#3",
                "close dependency_c#3",
                "close dependency_b#2",
                "close dependency_a#1",
            ]
        );
    }
}
