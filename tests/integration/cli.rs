//! The `blade` binary end to end.

use anyhow::Result;
use assert_cmd::Command;
use blade_engine::test_utils::{SiteFixture, TemplateEnvironment};
use predicates::prelude::*;
use std::fs;

fn blade(env: &TemplateEnvironment) -> Command {
    let mut cmd = Command::cargo_bin("blade").unwrap();
    cmd.current_dir(env.path())
        .env_remove("BLADE_CONFIG")
        .env_remove("BLADE_SKIP_COMPILED_EXT")
        .env_remove("RUST_LOG")
        .arg("--templates-dir")
        .arg(&env.templates_dir);
    cmd
}

#[test]
fn test_render_to_stdout() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    let data = env.path().join("data.json");
    fs::write(&data, r#"{"user": "<ada>"}"#)?;

    blade(&env)
        .args(["render", "pages/home", "--data"])
        .arg(&data)
        .assert()
        .success()
        .stdout("<title>Home</title>\n<nav>&lt;ada&gt;</nav>\n<main><p>Welcome</p></main>");
    Ok(())
}

#[test]
fn test_render_reads_stdin_and_writes_file() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("hello.blade.tpl", "Hello {{ $name }}")?;
    let output = env.path().join("out/hello.txt");

    blade(&env)
        .args(["render", "hello", "--data", "-", "--output"])
        .arg(&output)
        .write_stdin(r#"{"name": "world"}"#)
        .assert()
        .success()
        .stdout("");
    assert_eq!(fs::read_to_string(&output)?, "Hello world");
    Ok(())
}

#[test]
fn test_render_missing_template_suggests() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;

    blade(&env)
        .args(["render", "pages/hom.blade.tpl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("pages/home.blade.tpl"));
    Ok(())
}

#[test]
fn test_compile_prints_tera_text() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("list.blade.tpl", "@foreach($items as $i){{ $i }}@endforeach")?;

    blade(&env)
        .args(["compile", "list", "--deps"])
        .assert()
        .success()
        .stdout("{% for i in items %}{{ i | e }}{% endfor %}\n")
        .stderr(predicate::str::contains("(none)"));
    Ok(())
}

#[test]
fn test_validate_fails_on_broken_template() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::basic().write_to(&env)?;
    env.write("broken.blade.tpl", "@section('x')")?;

    blade(&env)
        .args(["validate", "--format", "json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"valid\": false"))
        .stdout(predicate::str::contains("broken.blade.tpl"));

    env.remove("broken.blade.tpl")?;
    blade(&env)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Validated 3 of 3 templates"));
    Ok(())
}

#[test]
fn test_preload_then_cache_commands() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;

    blade(&env)
        .arg("preload")
        .assert()
        .success()
        .stdout(predicate::str::contains("Preloaded 4 of 4 templates"));
    assert!(env.cache_files().contains(&"pages_home.blade.tpl.compiled".to_string()));

    blade(&env)
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout("pages/about.blade.tpl\npages/home.blade.tpl\n");

    blade(&env)
        .args(["cache", "stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 2"));

    blade(&env).args(["cache", "clear"]).assert().success();
    assert!(env.cache_files().is_empty());
    Ok(())
}

#[test]
fn test_config_file_is_honoured() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    let views = env.path().join("views");
    fs::create_dir_all(&views)?;
    fs::write(views.join("page.tpl"), "@if($on)on@endif")?;
    let config = env.path().join("blade.toml");
    fs::write(&config, "templates_dir = \"views\"\ntemplate_extension = \".tpl\"\n")?;

    let mut cmd = Command::cargo_bin("blade")?;
    cmd.current_dir(env.path())
        .env("BLADE_CONFIG", &config)
        .args(["render", "page", "--data", "-"])
        .write_stdin(r#"{"on": true}"#)
        .assert()
        .success()
        .stdout("on");
    Ok(())
}
