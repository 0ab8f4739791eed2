//! Layout composition: sections, blocks, yields and inheritance chains.

use anyhow::Result;
use blade_engine::core::BladeError;
use blade_engine::test_utils::{SiteFixture, TemplateEnvironment};
use serde_json::json;

#[test]
fn test_basic_site_renders() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    SiteFixture::with_about().write_to(&env)?;
    let engine = env.engine()?;

    let home = engine.render_to_string("pages/home", &json!({ "user": "ada" }))?;
    assert_eq!(home, "<title>Home</title>\n<nav>ada</nav>\n<main><p>Welcome</p></main>");

    // about keeps the layout's default title
    let about = engine.render_to_string("pages/about", &json!({ "user": "bob" }))?;
    assert_eq!(about, "<title>Site</title>\n<nav>bob</nav>\n<main><p>About bob</p></main>");
    Ok(())
}

#[test]
fn test_default_block_with_yielded_content() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/base.blade.tpl",
        "<title>@block('title')Default Title@endblock</title>@yield('content')",
    )?;
    env.write(
        "page.blade.tpl",
        "@extends('layouts/base')\n@section('content')<p>Body</p>@endsection",
    )?;
    let engine = env.engine()?;

    let html = engine.render_to_string("page", &json!({}))?;
    assert!(html.contains("Default Title"));
    assert!(html.contains("<p>Body</p>"));
    Ok(())
}

#[test]
fn test_section_replaces_block_default() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/base.blade.tpl",
        "<header>@block('header')Default Header@endblock</header>",
    )?;
    env.write(
        "page.blade.tpl",
        "@extends('layouts/base')\n@section('header')\nCustom Header\n@endsection",
    )?;
    let engine = env.engine()?;

    let html = engine.render_to_string("page", &json!({}))?;
    assert_eq!(html, "<header>Custom Header</header>");
    assert!(!html.contains("Default Header"));
    Ok(())
}

#[test]
fn test_nested_blocks_override_independently() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/nested.blade.tpl",
        "@block('outer')<div>@block('inner')Inner Default@endblock</div>@endblock",
    )?;
    env.write(
        "inner.blade.tpl",
        "@extends('layouts/nested')\n@section('inner')Overridden Inner@endsection",
    )?;
    env.write(
        "outer.blade.tpl",
        "@extends('layouts/nested')\n@section('outer')<section>@parent</section>@endsection",
    )?;
    env.write(
        "replaced.blade.tpl",
        "@extends('layouts/nested')\n@section('outer')Replaced@endsection",
    )?;
    let engine = env.engine()?;

    // Overriding the inner block keeps the outer markup
    assert_eq!(
        engine.render_to_string("inner", &json!({}))?,
        "<div>Overridden Inner</div>"
    );
    // Overriding the outer block with @parent keeps the inner default
    assert_eq!(
        engine.render_to_string("outer", &json!({}))?,
        "<section><div>Inner Default</div></section>"
    );
    assert_eq!(engine.render_to_string("replaced", &json!({}))?, "Replaced");
    Ok(())
}

#[test]
fn test_three_level_inheritance() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/root.blade.tpl",
        "<h1>@yield('title', 'Root')</h1><main>@yield('content')</main><footer>@block('footer')(c)@endblock</footer>",
    )?;
    env.write(
        "layouts/docs.blade.tpl",
        "@extends('layouts/root')\n@section('title', 'Docs')\n@section('footer')docs footer@endsection\n\
         @section('content')<nav>toc</nav>@yield('body')@endsection",
    )?;
    env.write(
        "guide.blade.tpl",
        "@extends('layouts/docs')\n@section('title', 'Guide')\n@section('body')<p>{{ $text }}</p>@endsection",
    )?;
    let engine = env.engine()?;

    let html = engine.render_to_string("guide", &json!({ "text": "read me" }))?;
    assert_eq!(
        html,
        "<h1>Guide</h1><main><nav>toc</nav><p>read me</p></main><footer>docs footer</footer>"
    );

    let compiled = engine.compile("guide")?;
    assert!(compiled.depends_on("layouts/docs.blade.tpl"));
    assert!(compiled.depends_on("layouts/root.blade.tpl"));
    Ok(())
}

#[test]
fn test_unresolved_yield_renders_empty() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("layouts/base.blade.tpl", "[@yield('missing')]")?;
    env.write("page.blade.tpl", "@extends('layouts/base')")?;
    let engine = env.engine()?;
    assert_eq!(engine.render_to_string("page", &json!({}))?, "[]");
    Ok(())
}

#[test]
fn test_unbalanced_section_is_compile_error() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("layouts/base.blade.tpl", "@yield('content')")?;
    env.write(
        "broken.blade.tpl",
        "@extends('layouts/base')\n@section('content')\n<p>never closed</p>",
    )?;
    let engine = env.engine()?;

    match engine.render("broken", &json!({})) {
        Err(BladeError::DirectiveSyntax { template, line, .. }) => {
            assert_eq!(template, "broken.blade.tpl");
            assert_eq!(line, 2);
        }
        other => panic!("expected directive syntax error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_missing_layout_names_the_child() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("page.blade.tpl", "@extends('layouts/nope')")?;
    let engine = env.engine()?;

    match engine.compile("page") {
        Err(BladeError::SourceNotFound {
            name, referenced_by, ..
        }) => {
            assert_eq!(name, "layouts/nope");
            assert_eq!(referenced_by.as_deref(), Some("page.blade.tpl"));
        }
        other => panic!("expected missing layout, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_layout_cycle_is_reported() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("a.blade.tpl", "@extends('b')")?;
    env.write("b.blade.tpl", "@extends('a')")?;
    let engine = env.engine()?;

    match engine.compile("a") {
        Err(BladeError::CircularReference { chain }) => {
            assert_eq!(chain, vec!["a.blade.tpl", "b.blade.tpl", "a.blade.tpl"]);
        }
        other => panic!("expected circular reference, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_native_block_syntax_in_directive_layout() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/mixed.blade.tpl",
        "<aside>{% block sidebar %}default{% endblock %}</aside>",
    )?;
    env.write(
        "page.blade.tpl",
        "@extends('layouts/mixed')\n@section('sidebar')links@endsection",
    )?;
    let engine = env.engine()?;
    assert_eq!(engine.render_to_string("page", &json!({}))?, "<aside>links</aside>");
    Ok(())
}

#[test]
fn test_yield_default_with_tera_syntax_stays_literal() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("layouts/base.blade.tpl", "[@yield('x', '{{ a }}{% endraw %}')]")?;
    env.write("page.blade.tpl", "@extends('layouts/base')")?;
    let engine = env.engine()?;
    assert_eq!(
        engine.render_to_string("page", &json!({}))?,
        "[{{ a }}{% endraw %}]"
    );
    Ok(())
}

#[test]
fn test_quote_in_section_name_is_compile_error() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("page.blade.tpl", "@section('a\"b')x@endsection")?;
    let engine = env.engine()?;
    assert!(matches!(
        engine.compile("page"),
        Err(BladeError::DirectiveSyntax { line: 1, .. })
    ));
    Ok(())
}
