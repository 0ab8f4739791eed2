//! File watching keeps cached templates in step with the templates directory.

use anyhow::Result;
use blade_engine::test_utils::{SiteFixture, TemplateEnvironment};
use blade_engine::watcher::TemplateWatcher;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` passes.
fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    condition()
}

#[test]
fn test_layout_edit_invalidates_page() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let engine = Arc::new(env.engine()?);
    engine.render("pages/home", &json!({ "user": "ada" }))?;

    let watcher = TemplateWatcher::watch(Arc::clone(&engine), &env.templates_dir, Duration::from_millis(20))?;
    // Give the backend a moment to register before editing
    thread::sleep(Duration::from_millis(100));

    env.write("layouts/app.blade.tpl", "<h1>@yield('title')</h1>@yield('content')")?;
    assert!(
        wait_for(Duration::from_secs(5), || !engine.cache().contains("pages/home.blade.tpl")),
        "page was not invalidated after its layout changed"
    );
    watcher.stop();

    let html = engine.render_to_string("pages/home", &json!({ "user": "ada" }))?;
    assert_eq!(html, "<h1>Home</h1><p>Welcome</p>");
    Ok(())
}

#[test]
fn test_unrelated_edit_keeps_cache() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let engine = Arc::new(env.engine()?);
    engine.render("pages/home", &json!({ "user": "ada" }))?;

    let watcher = TemplateWatcher::watch(Arc::clone(&engine), &env.templates_dir, Duration::from_millis(20))?;
    thread::sleep(Duration::from_millis(100));

    env.write("pages/other.blade.tpl", "other")?;
    thread::sleep(Duration::from_millis(300));
    assert!(engine.cache().contains("pages/home.blade.tpl"));

    watcher.stop();
    Ok(())
}
