//! Compiled-artifact cache: size accounting, clearing, invalidation and
//! reuse of the disk mirror across engine instances.

use anyhow::Result;
use blade_engine::cache::{DiskMirror, TemplateCache};
use blade_engine::core::BladeError;
use blade_engine::test_utils::{SiteFixture, TemplateEnvironment};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

const HOME_FILE: &str = "pages_home.blade.tpl.compiled";
const ABOUT_FILE: &str = "pages_about.blade.tpl.compiled";
const MANIFEST_FILE: &str = "compiled_manifest.json";

#[test]
fn test_size_accounting_never_exceeds_budget() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("a.blade.tpl", "aaaaaaaaaa")?;
    env.write("b.blade.tpl", "bbbbbbbbbbbbbbbbbbbb")?;
    env.write("c.blade.tpl", "cccccccccccccccccccccccccccccc")?;
    let engine = env.engine()?;

    let cache = TemplateCache::new(64, Duration::from_secs(3600), DiskMirror::disabled());
    let mut expected = 0;
    for name in ["a", "b"] {
        let compiled = Arc::new(engine.compile_uncached(name)?);
        expected += compiled.size();
        cache.set(compiled)?;
        assert_eq!(cache.stats().current_size_bytes, expected);
    }
    assert_eq!(expected, 30);

    // 30 + 30 fits, a fourth entry of 30 does not and nothing is stale
    cache.set(Arc::new(engine.compile_uncached("c")?))?;
    assert_eq!(cache.stats().current_size_bytes, 60);

    env.write("d.blade.tpl", "dddddddddddddddddddddddddddddd")?;
    let err = cache.set(Arc::new(engine.compile_uncached("d")?)).unwrap_err();
    assert!(matches!(err, BladeError::CacheFull { size: 30, max_size: 64, .. }));
    let stats = cache.stats();
    assert_eq!(stats.count, 3);
    assert!(stats.current_size_bytes <= stats.max_size_bytes);
    Ok(())
}

#[test]
fn test_render_populates_mirror_and_clear_removes_everything() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;
    env.write("plain.html", "<p>{{ user | escape }}</p>")?;
    let engine = env.engine()?;

    for name in ["pages/home", "pages/about", "plain.html"] {
        engine.render(name, &json!({ "user": "ada" }))?;
    }

    // Native templates and fragment directories stay in memory only
    assert_eq!(env.cache_files(), vec![MANIFEST_FILE, ABOUT_FILE, HOME_FILE]);
    assert_eq!(engine.cache_stats().count, 3);

    engine.clear_cache();
    let stats = engine.cache_stats();
    assert_eq!(stats.count, 0);
    assert_eq!(stats.current_size_bytes, 0);
    assert!(env.cache_files().is_empty());
    Ok(())
}

#[test]
fn test_layout_change_invalidates_dependents() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;
    env.write("standalone.blade.tpl", "alone")?;
    let engine = env.engine()?;

    for name in ["pages/home", "pages/about", "standalone"] {
        engine.render(name, &json!({ "user": "ada" }))?;
    }

    let layout = env.write(
        "layouts/app.blade.tpl",
        "<h1>@yield('title', 'Site')</h1>@yield('content')",
    )?;
    let mut removed = engine.on_changed(&layout);
    removed.sort();
    assert_eq!(removed, vec!["pages/about.blade.tpl", "pages/home.blade.tpl"]);
    assert_eq!(engine.cached_templates(), vec!["standalone.blade.tpl"]);

    let files = env.cache_files();
    assert!(!files.contains(&HOME_FILE.to_string()));
    assert!(!files.contains(&ABOUT_FILE.to_string()));

    let home = engine.render_to_string("pages/home", &json!({ "user": "ada" }))?;
    assert_eq!(home, "<h1>Home</h1><p>Welcome</p>");
    Ok(())
}

#[test]
fn test_include_change_invalidates_through_layout() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let engine = env.engine()?;
    engine.render("pages/home", &json!({ "user": "ada" }))?;

    // The nav is included by the layout, which the page extends
    let removed = engine.invalidate("components/nav.blade.tpl");
    assert_eq!(removed, vec!["pages/home.blade.tpl"]);
    assert!(engine.cached_templates().is_empty());
    Ok(())
}

#[test]
fn test_new_engine_reuses_fresh_mirror() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    env.engine()?.render("pages/home", &json!({ "user": "ada" }))?;

    // Stand-in text proves the second engine read the mirror instead of compiling
    let mirrored = env.cache_dir.join(HOME_FILE);
    fs::write(&mirrored, "MIRRORED {{ user }}")?;
    fs::File::options()
        .write(true)
        .open(&mirrored)?
        .set_modified(SystemTime::now() + Duration::from_secs(600))?;

    let warm = env.engine()?;
    assert_eq!(warm.render_to_string("pages/home", &json!({ "user": "ada" }))?, "MIRRORED ada");

    // A dependency edited after the mirror was written makes it stale
    env.touch_later("layouts/app.blade.tpl", Duration::from_secs(3600))?;
    let cold = env.engine()?;
    assert_eq!(
        cold.render_to_string("pages/home", &json!({ "user": "ada" }))?,
        "<title>Home</title>\n<nav>ada</nav>\n<main><p>Welcome</p></main>"
    );
    Ok(())
}

#[test]
fn test_preload_reports_every_failure() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;
    env.write("broken.blade.tpl", "@if($x)never closed")?;
    env.write("cycle.blade.tpl", "@include('cycle')")?;
    env.write("native.html", "{{ ignored }}")?;
    let engine = env.engine()?;

    let report = engine.preload_all()?;
    assert!(!report.is_success());
    assert_eq!(report.total(), 6);
    assert_eq!(report.compiled.len(), 4);

    let failed: Vec<&str> = report.failures.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(failed, vec!["broken.blade.tpl", "cycle.blade.tpl"]);
    assert!(matches!(report.failures[0].1, BladeError::DirectiveSyntax { .. }));
    assert!(matches!(report.failures[1].1, BladeError::CircularReference { .. }));

    let summary = report.to_string();
    assert!(summary.starts_with("4 of 6 templates compiled"), "{summary}");
    assert!(summary.contains("broken.blade.tpl"));

    // Everything that compiled is cached; native files are not preloaded
    assert!(engine.cache().contains("pages/home.blade.tpl"));
    assert!(!engine.cache().contains("native.html"));
    Ok(())
}

#[test]
fn test_disabled_persistence_writes_nothing() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let mut config = env.config();
    config.cache.persist = false;
    let engine = env.engine_with(config)?;

    engine.render("pages/home", &json!({ "user": "ada" }))?;
    assert_eq!(engine.cache_stats().count, 1);
    assert!(env.cache_files().is_empty());
    Ok(())
}

#[test]
fn test_concurrent_renders_of_cold_template() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let engine = Arc::new(env.engine()?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.render_to_string("pages/home", &json!({ "user": "ada" })))
        })
        .collect();
    let outputs = handles
        .into_iter()
        .map(|handle| handle.join().expect("render thread panicked"))
        .collect::<Result<Vec<_>, _>>()?;

    assert!(outputs.iter().all(|html| html == &outputs[0]));
    assert_eq!(outputs[0], "<title>Home</title>\n<nav>ada</nav>\n<main><p>Welcome</p></main>");

    let stats = engine.cache_stats();
    assert_eq!(stats.count, 1);
    let cached = engine.cache().get("pages/home.blade.tpl").expect("home is cached");
    assert_eq!(stats.current_size_bytes, cached.size());
    Ok(())
}

#[test]
fn test_invalidate_during_concurrent_renders() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;
    let engine = Arc::new(env.engine()?);

    let renderers: Vec<_> = ["pages/home", "pages/about"]
        .into_iter()
        .cycle()
        .take(6)
        .map(|name| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || -> blade_engine::core::Result<()> {
                for _ in 0..50 {
                    let html = engine.render_to_string(name, &json!({ "user": "ada" }))?;
                    assert!(html.starts_with("<title>"), "{html}");
                    assert!(html.contains("<nav>ada</nav>"), "{html}");
                }
                Ok(())
            })
        })
        .collect();
    for _ in 0..50 {
        engine.invalidate("layouts/app.blade.tpl");
        thread::yield_now();
    }
    for handle in renderers {
        handle.join().expect("render thread panicked")?;
    }

    // The byte total always matches what is actually cached
    let stats = engine.cache_stats();
    let cached: usize = engine
        .cached_templates()
        .iter()
        .filter_map(|name| engine.cache().get(name))
        .map(|template| template.size())
        .sum();
    assert_eq!(stats.current_size_bytes, cached);
    assert!(stats.count <= 2);

    let home = engine.render_to_string("pages/home", &json!({ "user": "bob" }))?;
    assert_eq!(home, "<title>Home</title>\n<nav>bob</nav>\n<main><p>Welcome</p></main>");
    Ok(())
}
