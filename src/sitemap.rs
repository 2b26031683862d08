// Build-time sitemap.xml: fixed site routes plus routes found in the page sources

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATIC_ROUTES: &[&str] = &["", "/blog", "/casos", "/servicios", "/contacto"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Weekly,
}

impl ChangeFreq {
    fn as_str(&self) -> &'static str {
        match self {
            ChangeFreq::Daily => "daily",
            ChangeFreq::Weekly => "weekly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub loc: String,
    pub changefreq: ChangeFreq,
    pub priority: &'static str,
}

#[derive(Debug, Clone)]
pub struct SitemapConfig {
    pub site_url: String,
    pub static_routes: Vec<String>,
    pub pages_dir: PathBuf,
    pub extension: String,
}

// skips [id].tsx, _app.tsx and the top-level api dir; blog/index.tsx becomes /blog
pub fn discover_routes(pages_dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut routes = Vec::new();
    if !pages_dir.is_dir() {
        return Ok(routes);
    }
    walk(pages_dir, pages_dir, extension, &mut routes)?;
    routes.sort();
    Ok(routes)
}

fn walk(root: &Path, dir: &Path, extension: &str, routes: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if path.is_dir() {
            if dir == root && name == "api" {
                continue;
            }
            walk(root, &path, extension, routes)?;
            continue;
        }

        if name.starts_with('[') || name.starts_with('_') {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        if let Ok(relative) = path.with_extension("").strip_prefix(root) {
            routes.push(route_for(relative));
        }
    }
    Ok(())
}

fn route_for(relative: &Path) -> String {
    let mut route = String::new();
    for part in relative.components() {
        route.push('/');
        route.push_str(&part.as_os_str().to_string_lossy());
    }
    if route == "/index" {
        return String::new();
    }
    match route.strip_suffix("/index") {
        Some(parent) => parent.to_string(),
        None => route,
    }
}

pub fn build_entries(site_url: &str, static_routes: &[String], pages: &[String]) -> Vec<SitemapEntry> {
    let site_url = site_url.trim_end_matches('/');

    let mut entries: Vec<SitemapEntry> = static_routes
        .iter()
        .map(|route| SitemapEntry {
            loc: format!("{}{}", site_url, route),
            changefreq: ChangeFreq::Daily,
            priority: if route.is_empty() { "1.0" } else { "0.8" },
        })
        .collect();

    // pages already listed as static routes keep their static entry
    for route in pages.iter().filter(|r| !static_routes.contains(r)) {
        entries.push(SitemapEntry {
            loc: format!("{}{}", site_url, route),
            changefreq: ChangeFreq::Weekly,
            priority: "0.6",
        });
    }

    entries
}

pub fn render(entries: &[SitemapEntry], generated_at: DateTime<Utc>) -> String {
    let lastmod = generated_at.to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>{}</changefreq>\n    <priority>{}</priority>\n  </url>\n",
            escape_xml(&entry.loc),
            lastmod,
            entry.changefreq.as_str(),
            entry.priority
        );
    }
    xml.push_str("</urlset>");
    xml
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn generate(config: &SitemapConfig, generated_at: DateTime<Utc>) -> io::Result<String> {
    let pages = discover_routes(&config.pages_dir, &config.extension)?;
    let entries = build_entries(&config.site_url, &config.static_routes, &pages);
    tracing::info!(
        static_routes = config.static_routes.len(),
        pages = pages.len(),
        "Sitemap routes collected"
    );
    Ok(render(&entries, generated_at))
}

// Generates and writes the sitemap, creating parent directories
pub fn write_sitemap(config: &SitemapConfig, out: &Path) -> io::Result<()> {
    let xml = generate(config, Utc::now())?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, xml)?;
    tracing::info!(path = %out.display(), "Sitemap generated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export default {}").unwrap();
    }

    fn static_routes() -> Vec<String> {
        DEFAULT_STATIC_ROUTES.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_discover_routes_filters_special_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "index.tsx");
        touch(root, "equipo.tsx");
        touch(root, "blog/index.tsx");
        touch(root, "blog/ia-generativa.tsx");
        touch(root, "blog/[slug].tsx");
        touch(root, "_app.tsx");
        touch(root, "api/contact.tsx");
        touch(root, "styles.css");
        touch(root, "indexes/list.tsx");

        let routes = discover_routes(root, "tsx").unwrap();
        assert_eq!(
            routes,
            vec!["", "/blog", "/blog/ia-generativa", "/equipo", "/indexes/list"]
        );
    }

    #[test]
    fn test_missing_pages_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let routes = discover_routes(&dir.path().join("nope"), "tsx").unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn test_build_entries_priorities() {
        let entries = build_entries(
            "https://zettai.com/",
            &static_routes(),
            &["".to_string(), "/blog".to_string(), "/equipo".to_string()],
        );

        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].loc, "https://zettai.com");
        assert_eq!(entries[0].priority, "1.0");
        assert_eq!(entries[0].changefreq, ChangeFreq::Daily);
        assert_eq!(entries[1].loc, "https://zettai.com/blog");
        assert_eq!(entries[1].priority, "0.8");

        let last = entries.last().unwrap();
        assert_eq!(last.loc, "https://zettai.com/equipo");
        assert_eq!(last.priority, "0.6");
        assert_eq!(last.changefreq, ChangeFreq::Weekly);
    }

    #[test]
    fn test_render() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        let entries = vec![SitemapEntry {
            loc: "https://zettai.com/blog?a=1&b=2".to_string(),
            changefreq: ChangeFreq::Weekly,
            priority: "0.6",
        }];

        let xml = render(&entries, at);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset"));
        assert!(xml.contains("<loc>https://zettai.com/blog?a=1&amp;b=2</loc>"));
        assert!(xml.contains("<lastmod>2026-10-19T08:30:00.000Z</lastmod>"));
        assert!(xml.contains("<changefreq>weekly</changefreq>"));
        assert!(xml.ends_with("</urlset>"));
    }

    #[test]
    fn test_write_sitemap() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("pages"), "equipo.tsx");
        let out = dir.path().join("public/sitemap.xml");

        let config = SitemapConfig {
            site_url: "https://zettai.com".to_string(),
            static_routes: static_routes(),
            pages_dir: dir.path().join("pages"),
            extension: "tsx".to_string(),
        };
        write_sitemap(&config, &out).unwrap();

        let xml = fs::read_to_string(out).unwrap();
        assert_eq!(xml.matches("<url>").count(), 6);
        assert!(xml.contains("<loc>https://zettai.com/equipo</loc>"));
    }
}
