//! Reusable template sets.

use anyhow::Result;

use super::TemplateEnvironment;

/// A named collection of templates written together.
#[derive(Debug, Clone, Default)]
pub struct SiteFixture {
    pub templates: Vec<(String, String)>,
}

impl SiteFixture {
    /// Layout with `title`/`content` yields, a nav component and a home page.
    ///
    /// `pages/home` renders to
    /// `<title>Home</title>\n<nav>{user}</nav>\n<main><p>Welcome</p></main>`.
    pub fn basic() -> Self {
        Self::default()
            .with(
                "layouts/app.blade.tpl",
                "<title>@yield('title', 'Site')</title>\n@include('components/nav')\n<main>@yield('content')</main>",
            )
            .with("components/nav.blade.tpl", "<nav>{{ $user }}</nav>")
            .with(
                "pages/home.blade.tpl",
                "@extends('layouts/app')\n@section('title', 'Home')\n@section('content')\n<p>Welcome</p>\n@endsection",
            )
    }

    /// [`SiteFixture::basic`] plus an about page that keeps the default title.
    pub fn with_about() -> Self {
        Self::basic().with(
            "pages/about.blade.tpl",
            "@extends('layouts/app')\n@section('content')\n<p>About {{ $user }}</p>\n@endsection",
        )
    }

    pub fn with(mut self, name: &str, content: &str) -> Self {
        self.templates.push((name.to_string(), content.to_string()));
        self
    }

    pub fn write_to(&self, env: &TemplateEnvironment) -> Result<()> {
        for (name, content) in &self.templates {
            env.write(name, content)?;
        }
        Ok(())
    }
}
