//! Offline description of a link from the shape of its URL.
//!
//! Used when the linked page cannot be loaded: the domain and path of
//! well-known sites say a lot about what is behind a link.

use url::Url;

/// What the URL structure reveals about a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkShape {
    Issue { host: String, repo: String, number: String },
    PullRequest { host: String, repo: String, number: String },
    Release { host: String, repo: String, tag: Option<String> },
    Repository { host: String, repo: String, section: Option<String> },
    Profile { host: String, owner: String },
    Question { site: String, id: String, title: Option<String> },
    BlogPost { platform: String, title: Option<String> },
    Encyclopedia { title: String, language: String },
    Video { platform: String, id: Option<String> },
    Generic { domain: String, path: Vec<String> },
    Unparseable,
}

const CODE_HOSTS: &[(&str, &str)] = &[
    ("github.com", "GitHub"),
    ("gitlab.com", "GitLab"),
    ("bitbucket.org", "Bitbucket"),
];

const BLOG_HOSTS: &[(&str, &str)] = &[
    ("medium.com", "Medium"),
    ("dev.to", "DEV Community"),
    ("substack.com", "Substack"),
    ("hashnode.dev", "Hashnode"),
    ("wordpress.com", "WordPress"),
    ("blogspot.com", "Blogger"),
    ("ghost.io", "Ghost"),
];

/// Classify `url` against the known site shapes.
pub fn classify_url(url: &str) -> LinkShape {
    let Ok(parsed) = Url::parse(url) else {
        return LinkShape::Unparseable;
    };
    let Some(host) = parsed.host_str() else {
        return LinkShape::Unparseable;
    };
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).map(decode).collect())
        .unwrap_or_default();

    if let Some((_, name)) = CODE_HOSTS.iter().find(|(h, _)| host == *h) {
        return code_host_shape(name, &segments);
    }
    let qa_site = matches!(host.as_str(), "stackoverflow.com" | "superuser.com" | "serverfault.com")
        || host.ends_with(".stackexchange.com");
    if qa_site {
        if let [kind, id, rest @ ..] = segments.as_slice() {
            if kind == "questions" && id.chars().all(|c| c.is_ascii_digit()) {
                return LinkShape::Question {
                    site: host.clone(),
                    id: id.clone(),
                    title: rest.first().map(|slug| slug_to_title(slug)),
                };
            }
        }
    }
    if let Some((_, platform)) = BLOG_HOSTS
        .iter()
        .find(|(h, _)| host == *h || host.ends_with(&format!(".{}", h)))
    {
        return LinkShape::BlogPost {
            platform: platform.to_string(),
            title: segments.last().map(|slug| slug_to_title(slug)),
        };
    }
    if host.ends_with("wikipedia.org") {
        if let [wiki, title, ..] = segments.as_slice() {
            if wiki == "wiki" {
                let language = host.split('.').next().unwrap_or("en").to_string();
                return LinkShape::Encyclopedia {
                    title: title.replace('_', " "),
                    language,
                };
            }
        }
    }
    if host == "youtube.com" || host == "m.youtube.com" {
        let id = parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .or_else(|| match segments.as_slice() {
                [kind, id, ..] if kind == "shorts" || kind == "embed" => Some(id.clone()),
                _ => None,
            });
        return LinkShape::Video {
            platform: "YouTube".into(),
            id,
        };
    }
    if host == "youtu.be" {
        return LinkShape::Video {
            platform: "YouTube".into(),
            id: segments.first().cloned(),
        };
    }
    if host == "vimeo.com" {
        return LinkShape::Video {
            platform: "Vimeo".into(),
            id: segments.first().cloned(),
        };
    }

    LinkShape::Generic {
        domain: host,
        path: segments,
    }
}

fn code_host_shape(name: &str, segments: &[String]) -> LinkShape {
    let host = name.to_string();
    match segments {
        [owner] => LinkShape::Profile {
            host,
            owner: owner.clone(),
        },
        [owner, repo, rest @ ..] => {
            let repo = format!("{}/{}", owner, repo);
            // GitLab nests project pages under "-"
            let rest: Vec<&String> = rest.iter().filter(|s| s.as_str() != "-").collect();
            match rest.as_slice() {
                [kind, number, ..] if kind.as_str() == "issues" => LinkShape::Issue {
                    host,
                    repo,
                    number: number.to_string(),
                },
                [kind, number, ..]
                    if matches!(kind.as_str(), "pull" | "merge_requests" | "pull-requests") =>
                {
                    LinkShape::PullRequest {
                        host,
                        repo,
                        number: number.to_string(),
                    }
                }
                [kind, rest @ ..] if kind.as_str() == "releases" => LinkShape::Release {
                    host,
                    repo,
                    tag: match rest {
                        [tag_kw, tag, ..] if tag_kw.as_str() == "tag" => Some(tag.to_string()),
                        _ => None,
                    },
                },
                [] => LinkShape::Repository {
                    host,
                    repo,
                    section: None,
                },
                [section, ..] => LinkShape::Repository {
                    host,
                    repo,
                    section: Some(section.to_string()),
                },
            }
        }
        [] => LinkShape::Generic {
            domain: name.to_ascii_lowercase(),
            path: Vec::new(),
        },
    }
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// "my-first-post-3f2a1b" -> "My first post 3f2a1b"
fn slug_to_title(slug: &str) -> String {
    let words = slug
        .trim_end_matches(".html")
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => slug.to_string(),
    }
}

/// Templated description plus suggestions for a link that could not be read.
pub fn describe_link(url: &str, link_text: Option<&str>, error: Option<&str>) -> String {
    let shape = classify_url(url);
    let (summary, expect, suggestions) = describe_shape(&shape, url);

    let mut out = String::from("**Link Analysis (offline)**\n\n");
    out.push_str(&format!(
        "I couldn't open {} to read it directly, but the address itself tells me quite a bit.\n\n",
        url
    ));
    out.push_str(&summary);
    if let Some(text) = link_text.map(str::trim).filter(|t| !t.is_empty()) {
        out.push_str(&format!("\n\nThe link text reads: \"{}\".", text));
    }
    out.push_str("\n\n**What you'll likely find there:**\n");
    for line in expect {
        out.push_str(&format!("- {}\n", line));
    }
    out.push_str("\n**Suggestions:**\n");
    for line in suggestions {
        out.push_str(&format!("- {}\n", line));
    }
    if let Some(error) = error.filter(|e| !e.is_empty()) {
        out.push_str(&format!("\n*Technical detail: {}*", error));
    }
    out.trim_end().to_string()
}

fn describe_shape(shape: &LinkShape, url: &str) -> (String, Vec<String>, Vec<String>) {
    match shape {
        LinkShape::Issue { host, repo, number } => (
            format!("This is issue #{} in the {} repository **{}**.", number, host, repo),
            vec![
                "A bug report, feature request or question filed by a user".into(),
                "Discussion comments from maintainers and contributors".into(),
                "Labels, status (open or closed) and possibly linked pull requests".into(),
            ],
            vec![
                format!("Check whether issue #{} is still open before relying on it", number),
                format!("Browse the other issues of {} for related reports", repo),
                "Look for a linked pull request that fixes it".into(),
            ],
        ),
        LinkShape::PullRequest { host, repo, number } => (
            format!("This is pull request #{} in the {} repository **{}**.", number, host, repo),
            vec![
                "A proposed code change with a description of what it does".into(),
                "The diff of changed files and review comments".into(),
                "CI status and whether it was merged".into(),
            ],
            vec![
                "Read the description first, then the changed files".into(),
                format!("Check the linked issues of {} for the motivation", repo),
            ],
        ),
        LinkShape::Release { host, repo, tag } => (
            match tag {
                Some(tag) => format!("This is the {} release page for **{}** at version {}.", host, repo, tag),
                None => format!("This is the {} releases page for **{}**.", host, repo),
            },
            vec![
                "Release notes describing new features and fixes".into(),
                "Downloadable assets or binaries".into(),
            ],
            vec![
                "Look for breaking changes before upgrading".into(),
                format!("Compare with earlier releases of {}", repo),
            ],
        ),
        LinkShape::Repository { host, repo, section } => (
            match section {
                Some(section) => format!(
                    "This points into the **{}** section of the {} repository **{}**.",
                    section, host, repo
                ),
                None => format!("This is the {} repository **{}**.", host, repo),
            },
            vec![
                "Source code and a README explaining the project".into(),
                "Issues, pull requests and release history".into(),
            ],
            vec![
                "Start with the README for an overview".into(),
                "Check recent activity to see if the project is maintained".into(),
            ],
        ),
        LinkShape::Profile { host, owner } => (
            format!("This is the {} profile of **{}**.", host, owner),
            vec!["Their public repositories and recent activity".into()],
            vec!["Look at pinned repositories for their main work".into()],
        ),
        LinkShape::Question { site, id, title } => (
            match title {
                Some(title) => format!("This is question {} on {}: **{}**.", id, site, title),
                None => format!("This is question {} on {}.", id, site),
            },
            vec![
                "A question with code or error details".into(),
                "Community answers ranked by votes, possibly an accepted answer".into(),
            ],
            vec![
                "Read the accepted and highest-voted answers first".into(),
                "Check the answer dates; older answers may be outdated".into(),
            ],
        ),
        LinkShape::BlogPost { platform, title } => (
            match title {
                Some(title) => format!("This looks like a {} article: **{}**.", platform, title),
                None => format!("This looks like a page on {}.", platform),
            },
            vec![
                "A personal or professional write-up, tutorial or opinion piece".into(),
                "Possibly code samples and links to further reading".into(),
            ],
            vec![
                "Check the publication date for relevance".into(),
                "Cross-check technical claims with official documentation".into(),
            ],
        ),
        LinkShape::Encyclopedia { title, language } => (
            format!("This is the Wikipedia ({}) article **{}**.", language, title),
            vec![
                format!("An encyclopedic overview of {}", title),
                "History, key facts and references to sources".into(),
            ],
            vec![
                "Read the lead section for a summary".into(),
                "Follow the references for primary sources".into(),
            ],
        ),
        LinkShape::Video { platform, id } => (
            match id {
                Some(id) => format!("This is a {} video (id {}).", platform, id),
                None => format!("This is a {} video page.", platform),
            },
            vec![
                "A video with a title, description and comments".into(),
                "Possibly chapters or a transcript".into(),
            ],
            vec!["Check the description for a summary and timestamps".into()],
        ),
        LinkShape::Generic { domain, path } => (
            if path.is_empty() {
                format!("This is the home page of **{}**.", domain)
            } else {
                format!(
                    "This is a page on **{}** under `/{}`.",
                    domain,
                    path.join("/")
                )
            },
            vec![format!("Content published by {}", domain)],
            vec![
                "Open the link directly to read the full page".into(),
                "Ask me about the site if you want general background".into(),
            ],
        ),
        LinkShape::Unparseable => (
            format!("The address `{}` doesn't look like a valid web URL.", url),
            vec!["Possibly an internal or malformed link".into()],
            vec!["Check that the link is complete and try again".into()],
        ),
    }
}
