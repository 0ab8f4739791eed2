//! Rendering through a filesystem-backed engine.

use anyhow::Result;
use blade_engine::core::BladeError;
use blade_engine::test_utils::TemplateEnvironment;
use serde_json::json;

const SCRIPT: &str = "<script>alert(1)</script>";
const ESCAPED_SCRIPT: &str = "&lt;script&gt;alert(1)&lt;&#x2F;script&gt;";

#[test]
fn test_escaped_and_raw_echo() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("pages/profile.blade.tpl", "<p>{{ $user.Name }}</p><div>{!! $raw !!}</div>")?;
    let engine = env.engine()?;

    let html = engine.render_to_string(
        "pages/profile",
        &json!({ "user": { "Name": SCRIPT }, "raw": SCRIPT }),
    )?;

    assert_eq!(html, format!("<p>{ESCAPED_SCRIPT}</p><div>{SCRIPT}</div>"));
    Ok(())
}

#[test]
fn test_arrow_property_access() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("card.blade.tpl", "{{ $user->profile->name }}")?;
    let engine = env.engine()?;
    let html = engine.render_to_string("card", &json!({ "user": { "profile": { "name": "Ada" } } }))?;
    assert_eq!(html, "Ada");
    Ok(())
}

#[test]
fn test_directive_and_native_templates_render_identically() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "list.blade.tpl",
        "<h1>{{ $title }}</h1>@if($items)<ul>@foreach($items as $item)<li>{{ $item }}</li>@endforeach</ul>@else<p>empty</p>@endif{!! $footer !!}",
    )?;
    env.write(
        "list.html",
        "<h1>{{ title | escape }}</h1>{% if items %}<ul>{% for item in items %}<li>{{ item | escape }}</li>{% endfor %}</ul>{% else %}<p>empty</p>{% endif %}{{ footer | safe }}",
    )?;
    let engine = env.engine()?;

    for data in [
        json!({ "title": "A & B", "items": ["<x>", "y"], "footer": "<hr>" }),
        json!({ "title": "none", "items": [], "footer": "" }),
    ] {
        let directive = engine.render("list.blade.tpl", &data)?;
        let native = engine.render("list.html", &data)?;
        assert_eq!(directive, native);
    }
    Ok(())
}

#[test]
fn test_control_flow_directives() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "flow.blade.tpl",
        "@unless($done)todo@endunless|@if($n > 2)big@elseif($n > 0)small@else zero@endif|\
         @foreach($scores as $name => $score)[{{ $name }}={{ $score }}]@endforeach",
    )?;
    let engine = env.engine()?;

    let html = engine.render_to_string(
        "flow",
        &json!({ "done": false, "n": 1, "scores": { "ada": 3, "bob": 5 } }),
    )?;
    assert_eq!(html, "todo|small|[ada=3][bob=5]");

    let html = engine.render_to_string("flow", &json!({ "done": true, "n": 0, "scores": {} }))?;
    assert_eq!(html, "| zero|");
    Ok(())
}

#[test]
fn test_literal_text_survives() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "literal.blade.tpl",
        "mail admin@example.com, @@handle, @{{ name }}{{-- gone --}}@php $x = 1; @endphp.",
    )?;
    let engine = env.engine()?;
    let html = engine.render_to_string("literal", &json!({}))?;
    assert_eq!(html, "mail admin@example.com, @handle, {{ name }}.");
    Ok(())
}

#[test]
fn test_isset_helper() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "opt.blade.tpl",
        "@if(isset(map=user, key=\"email\")){{ $user.email }}@else no email@endif",
    )?;
    let engine = env.engine()?;
    assert_eq!(
        engine.render_to_string("opt", &json!({ "user": { "email": "a@b.c" } }))?,
        "a@b.c"
    );
    assert_eq!(engine.render_to_string("opt", &json!({ "user": {} }))?, " no email");
    Ok(())
}

#[test]
fn test_missing_variable_is_render_error() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("greet.blade.tpl", "Hello {{ $username }}")?;
    let engine = env.engine()?;

    match engine.render("greet", &json!({ "usernam": "ada" })) {
        Err(BladeError::Render { template, message }) => {
            assert_eq!(template, "greet.blade.tpl");
            assert!(message.contains("username"), "{message}");
        }
        other => panic!("expected render error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_non_object_data_is_rejected() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("plain.blade.tpl", "static")?;
    let engine = env.engine()?;
    assert!(matches!(engine.render("plain", &json!([1, 2])), Err(BladeError::Render { .. })));
    assert_eq!(engine.render_to_string("plain", &())?, "static");
    Ok(())
}

#[test]
fn test_render_to_writer() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("w.blade.tpl", "<b>{{ $x }}</b>")?;
    let engine = env.engine()?;
    let mut out = Vec::new();
    engine.render_to("w", &json!({ "x": 7 }), &mut out)?;
    assert_eq!(out, b"<b>7</b>");
    Ok(())
}

#[test]
fn test_escaped_echo_of_numbers_and_booleans() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "stats.blade.tpl",
        "Count: {{ $count }} Ok: {{ $ok }} Price: {{ $price * 2 }}",
    )?;
    env.write("stats.html", "Count: {{ count }} Ok: {{ ok }} Price: {{ price * 2 }}")?;
    let engine = env.engine()?;

    let data = json!({ "count": 3, "ok": true, "price": 1.5 });
    let directive = engine.render_to_string("stats", &data)?;
    assert_eq!(directive, "Count: 3 Ok: true Price: 3");
    assert_eq!(directive, engine.render_to_string("stats.html", &data)?);
    Ok(())
}

#[test]
fn test_numeric_loop_through_layout_slot() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "layouts/rows.blade.tpl",
        "@foreach($xs as $x)@yield('row')@endforeach",
    )?;
    env.write(
        "table.blade.tpl",
        "@extends('layouts/rows')\n@section('row')<i>{{ $x }}</i>@endsection",
    )?;
    let engine = env.engine()?;
    assert_eq!(engine.render_to_string("table", &json!({ "xs": [1, 2] }))?, "<i>1</i><i>2</i>");
    Ok(())
}

#[test]
fn test_keyword_named_variables_are_escaped() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write(
        "names.blade.tpl",
        "[{{ $raw }}][{{ $block->title }}][{{ $set }}][{{ $filter }}]",
    )?;
    let engine = env.engine()?;

    let html = engine.render_to_string(
        "names",
        &json!({ "raw": SCRIPT, "block": { "title": SCRIPT }, "set": SCRIPT, "filter": SCRIPT }),
    )?;
    assert_eq!(html, format!("[{ESCAPED_SCRIPT}]").repeat(4));
    Ok(())
}

#[test]
fn test_trim_markers_strip_surrounding_whitespace() -> Result<()> {
    let env = TemplateEnvironment::new()?;
    env.write("trim.blade.tpl", "x  {{- $name -}}  y|{{ $name -}}  !")?;
    let engine = env.engine()?;
    assert_eq!(engine.render_to_string("trim", &json!({ "name": "ada" }))?, "xaday|ada!");
    Ok(())
}
