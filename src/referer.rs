use regex::Regex;

/// referer sent on the single retry after an upstream 403.
pub const FALLBACK_REFERER: &str = "https://mangabuddy.com/";

/// one entry of the ordered rule table. rules are evaluated in declaration
/// order and the first matching rule produces the referer.
enum Rule {
    /// numbered cdn hosts like `s3.mbcdnsb.org`: deep-link to the chapter
    /// page when the target url carries a recognizable chapter path,
    /// otherwise the site root.
    NumberedCdn {
        host: Regex,
        chapter_path: Regex,
        site: &'static str,
    },
    /// hostname contains any of the needles
    Substring {
        needles: &'static [&'static str],
        referer: &'static str,
    },
}

/// maps a target hostname (plus the full url for context) to the outbound
/// `Referer` value. the rule table is built once at startup and read-only
/// afterwards; `resolve` is pure and never fails.
pub struct RefererResolver {
    rules: Vec<Rule>,
}

impl RefererResolver {
    pub fn new() -> Self {
        let rules = vec![
            Rule::NumberedCdn {
                host: Regex::new(r"(?i)^s\d+\.mbcdns[a-z]+\.org$").expect("static regex"),
                chapter_path: Regex::new(r"(?i)/manga/([^/]+)/chapter-(\d+)")
                    .expect("static regex"),
                site: "https://mangabuddy.com",
            },
            // likemanga and its mirror cdns
            Rule::Substring {
                needles: &["likemanga.ink", "1stkmgv1.com", "1kmgv", "like1."],
                referer: "https://likemanga.ink/",
            },
            // backup and other manga mirrors; declaration order is the
            // lookup order, so earlier entries win on overlapping matches
            Rule::Substring {
                needles: &["mgcdn", "mbbcdn"],
                referer: "https://res.mgcdn.xyz/",
            },
            Rule::Substring {
                needles: &["mangapill", "readdetectiveconan"],
                referer: "https://mangapill.com/",
            },
            Rule::Substring {
                needles: &["hentaifox"],
                referer: "https://hentaifox.com/",
            },
            Rule::Substring {
                needles: &["nhentai"],
                referer: "https://nhentai.net/",
            },
        ];
        Self { rules }
    }

    /// first matching rule wins; with no match the referer is the target's
    /// own origin, which most hosts accept.
    pub fn resolve(&self, hostname: &str, target_url: &str) -> String {
        let host = hostname.to_ascii_lowercase();

        for rule in &self.rules {
            match rule {
                Rule::NumberedCdn {
                    host: host_re,
                    chapter_path,
                    site,
                } => {
                    if host_re.is_match(&host) {
                        return match chapter_path.captures(target_url) {
                            Some(caps) => {
                                format!("{}/manga/{}/chapter-{}", site, &caps[1], &caps[2])
                            }
                            None => format!("{}/", site),
                        };
                    }
                }
                Rule::Substring { needles, referer } => {
                    if needles.iter().any(|needle| host.contains(needle)) {
                        return (*referer).to_string();
                    }
                }
            }
        }

        format!("https://{}/", hostname)
    }
}

impl Default for RefererResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_cdn_with_chapter_path_deep_links() {
        let resolver = RefererResolver::new();
        let referer = resolver.resolve(
            "s3.mbcdnsb.org",
            "https://s3.mbcdnsb.org/manga/example-title/chapter-12/page-1.jpg",
        );
        assert_eq!(referer, "https://mangabuddy.com/manga/example-title/chapter-12");
    }

    #[test]
    fn numbered_cdn_without_chapter_path_uses_site_root() {
        let resolver = RefererResolver::new();
        let referer = resolver.resolve(
            "s12.mbcdnsab.org",
            "https://s12.mbcdnsab.org/covers/example.jpg",
        );
        assert_eq!(referer, "https://mangabuddy.com/");
    }

    #[test]
    fn numbered_cdn_host_match_is_case_insensitive() {
        let resolver = RefererResolver::new();
        let referer = resolver.resolve(
            "S3.MBCDNSB.ORG",
            "https://S3.MBCDNSB.ORG/MANGA/Example/CHAPTER-7/p.jpg",
        );
        assert_eq!(referer, "https://mangabuddy.com/manga/Example/chapter-7");
    }

    #[test]
    fn likemanga_mirror_family() {
        let resolver = RefererResolver::new();
        for host in ["img.likemanga.ink", "cdn.1stkmgv1.com", "a.1kmgv2.net", "like1.example.com"] {
            assert_eq!(resolver.resolve(host, ""), "https://likemanga.ink/");
        }
    }

    #[test]
    fn lookup_table_entries() {
        let resolver = RefererResolver::new();
        assert_eq!(resolver.resolve("res.mgcdn.xyz", ""), "https://res.mgcdn.xyz/");
        assert_eq!(resolver.resolve("img.mbbcdn.com", ""), "https://res.mgcdn.xyz/");
        assert_eq!(resolver.resolve("cdn.mangapill.com", ""), "https://mangapill.com/");
        assert_eq!(
            resolver.resolve("readdetectiveconan.com", ""),
            "https://mangapill.com/"
        );
        assert_eq!(resolver.resolve("i.hentaifox.com", ""), "https://hentaifox.com/");
        assert_eq!(resolver.resolve("i2.nhentai.net", ""), "https://nhentai.net/");
    }

    #[test]
    fn unmatched_host_falls_back_to_same_origin() {
        let resolver = RefererResolver::new();
        assert_eq!(
            resolver.resolve("images.example.com", "https://images.example.com/pic.png"),
            "https://images.example.com/"
        );
    }
}
