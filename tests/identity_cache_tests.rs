use std::cell::Cell;
use std::rc::Rc;

use rowkeep::{
    Entity, EntityHooks, MemoryConnection, PersistConfig, Repository, Row, Value, entity_type,
};

entity_type! {
    pub struct Page {
        table: "page",
        columns: [id, slug, lang, title],
        cache: [[id], [slug, lang]],
    }
}

entity_type! {
    pub struct Menu {
        table: "menu",
        columns: [id, slug, lang],
        cache: [[slug, lang]],
    }
}

entity_type! {
    pub struct Member {
        table: "member",
        columns: [id, email, name],
        cache: [[id], [email]],
    }
}

fn page_row(id: i64, slug: &str, lang: &str, title: &str) -> Row {
    Row::from([
        ("id".to_string(), Value::Integer(id)),
        ("slug".to_string(), Value::from(slug)),
        ("lang".to_string(), Value::from(lang)),
        ("title".to_string(), Value::from(title)),
    ])
}

fn page_repo(config: PersistConfig) -> Repository<Page, MemoryConnection> {
    let conn = MemoryConnection::mysql().with_table("page", "id");
    Repository::with_config(conn, config).unwrap()
}

#[test]
fn hydrations_with_equal_keys_share_one_entity() {
    let mut repo = page_repo(PersistConfig::default());

    let first = repo.hydrate(page_row(1, "home", "en", "Home"));
    let second = repo.hydrate(page_row(1, "home", "en", "Home (stale)"));

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(second.borrow().get("title"), Some(&Value::from("Home")));
    assert!(Rc::ptr_eq(&repo.cached("id", "1").unwrap(), &first));
    assert!(Rc::ptr_eq(&repo.cached("slug.lang", "home.en").unwrap(), &first));
}

#[test]
fn lookup_by_primary_key_goes_through_the_cache() {
    let mut repo = page_repo(PersistConfig::default());
    let id = repo
        .connection_mut()
        .seed_row("page", page_row(5, "about", "de", "Über uns"))
        .unwrap();

    let loaded = repo.by_primary_key(id.clone()).unwrap();
    let again = repo.by_primary_key(id).unwrap();
    assert!(Rc::ptr_eq(&loaded, &again));

    let by_values = repo
        .cached_by(&["slug", "lang"], &[Value::from("about"), Value::from("de")])
        .unwrap();
    assert!(Rc::ptr_eq(&by_values, &loaded));
}

#[test]
fn edits_through_one_handle_are_visible_through_the_other() {
    let mut repo = page_repo(PersistConfig::default());
    let first = repo.hydrate(page_row(2, "blog", "en", "Blog"));
    let second = repo.hydrate(page_row(2, "blog", "en", "Blog"));

    first.borrow_mut().set("title", "Journal").unwrap();
    assert!(second.borrow_mut().is_changed());

    repo.save(&mut second.borrow_mut(), false).unwrap();
    assert!(!first.borrow_mut().is_changed());
}

#[test]
fn disabled_cache_always_misses() {
    let mut repo = page_repo(PersistConfig::new().cache_enabled(false));

    let first = repo.hydrate(page_row(1, "home", "en", "Home"));
    let second = repo.hydrate(page_row(1, "home", "en", "Home"));

    assert!(!Rc::ptr_eq(&first, &second));
    assert!(repo.cached("id", "1").unwrap_err().is_cache_miss());
    assert!(!repo.cache().is_enabled());
}

#[test]
fn disabling_at_runtime_drops_registrations() {
    let mut repo = page_repo(PersistConfig::default());
    repo.hydrate(page_row(1, "home", "en", "Home"));
    assert!(repo.cached("id", "1").is_ok());

    repo.disable_cache();
    assert!(repo.cache().is_empty());
    assert!(repo.cached("id", "1").unwrap_err().is_cache_miss());

    repo.hydrate(page_row(1, "home", "en", "Home"));
    assert!(repo.cached("id", "1").is_err());
}

#[test]
fn clearing_keeps_the_cache_enabled() {
    let mut repo = page_repo(PersistConfig::default());
    let first = repo.hydrate(page_row(1, "home", "en", "Home"));
    repo.clear_cache();

    let second = repo.hydrate(page_row(1, "home", "en", "Home"));
    assert!(!Rc::ptr_eq(&first, &second));
    assert!(Rc::ptr_eq(&repo.cached("id", "1").unwrap(), &second));
}

#[test]
fn null_key_columns_render_as_empty() {
    let mut repo = page_repo(PersistConfig::default());
    let mut row = page_row(3, "draft", "en", "Draft");
    row.insert("lang".to_string(), Value::Null);
    let page = repo.hydrate(row);

    assert!(Rc::ptr_eq(&repo.cached("slug.lang", "draft.").unwrap(), &page));
}

#[test]
fn entity_types_keep_separate_caches() {
    let mut pages = page_repo(PersistConfig::default());
    let conn = MemoryConnection::mysql().with_table("menu", "id");
    let mut menus = Repository::<Menu, _>::new(conn).unwrap();

    pages.hydrate(page_row(1, "home", "en", "Home"));
    menus.hydrate(Row::from([
        ("id".to_string(), Value::Integer(9)),
        ("slug".to_string(), Value::from("home")),
        ("lang".to_string(), Value::from("en")),
    ]));

    assert_eq!(pages.cache().len(), 2);
    assert_eq!(menus.cache().len(), 1);
    assert!(menus.cached("id", "9").unwrap_err().is_cache_miss());
    assert_eq!(
        menus.cached("slug.lang", "home.en").unwrap().borrow().id(),
        Some(&Value::Integer(9))
    );
}

#[test]
fn rows_sharing_a_null_secondary_key_stay_distinct() {
    let conn = MemoryConnection::mysql().with_table("member", "id");
    let mut repo = Repository::<Member, _>::new(conn).unwrap();
    for name in ["ann", "bob"] {
        repo.connection_mut()
            .seed_row(
                "member",
                Row::from([
                    ("email".to_string(), Value::Null),
                    ("name".to_string(), Value::from(name)),
                ]),
            )
            .unwrap();
    }

    let first = repo.by_primary_key(1i64).unwrap();
    let second = repo.by_primary_key(2i64).unwrap();

    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(first.borrow().id(), Some(&Value::Integer(1)));
    assert_eq!(second.borrow().id(), Some(&Value::Integer(2)));
    assert_eq!(second.borrow().get("name"), Some(&Value::from("bob")));
    assert!(Rc::ptr_eq(&repo.by_primary_key(1i64).unwrap(), &first));
}

#[test]
fn stale_secondary_key_does_not_capture_another_row() {
    let mut repo = page_repo(PersistConfig::default());
    let home = repo.hydrate(page_row(1, "home", "en", "Home"));
    home.borrow_mut().set("slug", "start").unwrap();

    let newcomer = repo.hydrate(page_row(2, "home", "en", "New home"));
    assert!(!Rc::ptr_eq(&home, &newcomer));
    assert_eq!(newcomer.borrow().id(), Some(&Value::Integer(2)));
    assert!(Rc::ptr_eq(&repo.cached("slug.lang", "home.en").unwrap(), &newcomer));
    assert!(Rc::ptr_eq(&repo.cached("id", "1").unwrap(), &home));
}

#[derive(Clone, Default)]
struct LoadCounter {
    loads: Rc<Cell<usize>>,
}

impl EntityHooks<Page> for LoadCounter {
    fn on_load(&self, _entity: &mut Entity<Page>) {
        self.loads.set(self.loads.get() + 1);
    }
}

#[test]
fn cache_hit_skips_on_load() {
    let counter = LoadCounter::default();
    let mut repo = page_repo(PersistConfig::default()).with_hooks(counter.clone());

    repo.hydrate(page_row(1, "home", "en", "Home"));
    repo.hydrate(page_row(1, "home", "en", "Home"));
    assert_eq!(counter.loads.get(), 1);

    repo.hydrate(page_row(2, "about", "en", "About"));
    assert_eq!(counter.loads.get(), 2);
}

#[test]
fn purge_evicts_the_entity_from_the_cache() {
    let mut repo = page_repo(PersistConfig::default());
    let id = repo
        .connection_mut()
        .seed_row("page", page_row(1, "home", "en", "Home"))
        .unwrap();
    let page = repo.by_primary_key(id.clone()).unwrap();

    repo.purge(&mut page.borrow_mut()).unwrap();
    assert!(repo.cache().is_empty());
    assert!(repo.cached("id", "1").unwrap_err().is_cache_miss());
    assert!(repo.by_primary_key(id).is_err());
}
