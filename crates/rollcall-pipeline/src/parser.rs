use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use regex::Regex;
use rollcall_core::clock::DATE_FORMAT;
use rollcall_core::{AccountStatus, Column, LocalClock, ProfileRecord};
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Heading present on every rendered profile page.
pub const PROFILE_READY_SELECTOR: &str = "h1.cxl.clb.lsp";
/// Post card on the public posts page.
pub const POST_READY_SELECTOR: &str = "article.mbl";

const SUSPENSION_INDICATORS: [&str; 5] = [
    "accounts suspend",
    "aik se zyada fake accounts",
    "abuse ya harassment",
    "kisi aur user ki identity apnana",
    "accounts suspend kiye",
];

const INTRO_SELECTORS: [&str; 3] = ["span.cl.sp.lsp.nos", "span.cl", ".ow span.nos"];
const FOLLOWER_SELECTORS: [&str; 2] = ["span.cl.sp.clb", ".cl.sp.clb"];
const POST_COUNT_SELECTORS: [&str; 2] = [
    "a[href*='/profile/public/'] button div:first-child",
    "a[href*='/profile/public/'] button div",
];
const IMAGE_SELECTORS: [&str; 3] = [
    "img[src*='avatar-imgs']",
    "img[src*='avatar']",
    "div[style*='whitesmoke'] img[src*='cloudfront.net']",
];
const POST_LINK_SELECTORS: [&str; 3] = [
    "a[href*='/content/']",
    "a[href*='/comments/text/']",
    "a[href*='/comments/image/']",
];
const POST_TIME_SELECTORS: [&str; 4] = [
    "span[itemprop='datePublished']",
    "time[itemprop='datePublished']",
    "span.cxs.cgy",
    "time",
];

const LABELLED_FIELDS: [(&str, Column); 5] = [
    ("City:", Column::City),
    ("Gender:", Column::Gender),
    ("Married:", Column::Married),
    ("Age:", Column::Age),
    ("Joined:", Column::Joined),
];

/// Most recent post found on the public posts page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentPost {
    pub url: String,
    pub time: String,
}

/// Reads profile fields out of rendered forum pages.
#[derive(Debug, Clone)]
pub struct ProfilePageParser {
    base_url: Url,
    clock: LocalClock,
}

impl ProfilePageParser {
    pub fn new(base_url: &str, clock: LocalClock) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self { base_url, clock })
    }

    fn build_url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    /// Profile page to load, `<base>/users/<nick>/`.
    #[must_use]
    pub fn profile_url(&self, nickname: &str) -> String {
        self.build_url(&["users", nickname, ""])
    }

    /// PROFILE LINK value, `<base>/users/<nick>`.
    #[must_use]
    pub fn profile_link(&self, nickname: &str) -> String {
        self.build_url(&["users", nickname])
    }

    /// Public posts page, also the POST URL value.
    #[must_use]
    pub fn posts_url(&self, nickname: &str) -> String {
        self.build_url(&["profile", "public", nickname])
    }

    /// Build a record from a rendered profile page.
    ///
    /// Suspended and unverified accounts only get their status and intro;
    /// every other field is left empty for them.
    #[must_use]
    pub fn parse_profile(&self, html: &str, nickname: &str) -> ProfileRecord {
        let mut record = ProfileRecord::new(nickname);
        record.set(Column::Status, AccountStatus::Verified.to_string());
        record.set(
            Column::DateTimeScrap,
            self.clock.now().format(rollcall_core::clock::FULL_FORMAT).to_string(),
        );
        record.set(Column::ProfileLink, self.profile_link(nickname));
        record.set(Column::PostUrl, self.posts_url(nickname));

        let lower = html.to_lowercase();
        if SUSPENSION_INDICATORS.iter().any(|i| lower.contains(i))
            || lower.contains("account suspended")
        {
            record.set(Column::Status, AccountStatus::Banned.to_string());
            record.set(Column::Intro, "Account Suspended");
            return record;
        }
        if is_unverified(html, &lower) {
            record.set(Column::Status, AccountStatus::Unverified.to_string());
            record.set(Column::Intro, "Account Unverified");
            return record;
        }

        let document = Html::parse_document(html);
        let root = document.root_element();

        if let Some(intro) = first_text(root, &INTRO_SELECTORS) {
            record.set(Column::Intro, intro);
        }

        for (label, column) in LABELLED_FIELDS {
            let Some(value) = labelled_value(root, label) else {
                continue;
            };
            match column {
                Column::Joined => record.set(column, convert_relative_date(&value, self.clock.now())),
                Column::Gender => record.set(column, normalize_gender(&value)),
                Column::Married => record.set(column, normalize_married(&value)),
                _ => record.set(column, value),
            }
        }

        if let Some(followers) = first_number(root, &FOLLOWER_SELECTORS) {
            record.set(Column::Followers, followers);
        }
        if let Some(posts) = first_number(root, &POST_COUNT_SELECTORS) {
            record.set(Column::Posts, posts);
        }
        if let Some(image) = self.avatar(root) {
            record.set(Column::Image, image);
        }

        record
    }

    /// Read the newest post card from the public posts page.
    #[must_use]
    pub fn parse_recent_post(&self, html: &str) -> RecentPost {
        let document = Html::parse_document(html);
        let Some(article) = select_first(document.root_element(), POST_READY_SELECTOR) else {
            return RecentPost::default();
        };

        let url = POST_LINK_SELECTORS
            .iter()
            .find_map(|sel| select_first(article, sel)?.value().attr("href"))
            .map(|href| self.absolute(href))
            .unwrap_or_default();
        let time = first_text(article, &POST_TIME_SELECTORS)
            .map(|t| convert_relative_date(&t, self.clock.now()))
            .unwrap_or_default();

        RecentPost { url, time }
    }

    fn avatar(&self, root: ElementRef<'_>) -> Option<String> {
        IMAGE_SELECTORS.iter().find_map(|sel| {
            let src = select_first(root, sel)?.value().attr("src")?;
            (src.contains("avatar") || src.contains("cloudfront.net"))
                .then(|| self.absolute(&src.replace("/thumbnail/", "/")))
        })
    }

    fn absolute(&self, href: &str) -> String {
        self.base_url
            .join(href)
            .map_or_else(|_| href.to_string(), |u| u.to_string())
    }
}

/// Whether a parsed profile should be followed to its posts page.
#[must_use]
pub fn needs_recent_post(record: &ProfileRecord) -> bool {
    let posts = record.get(Column::Posts);
    record.account_status() == Some(AccountStatus::Verified) && !posts.is_empty() && posts != "0"
}

/// Turn "N unit(s) ago" into a `dd-Mon-yy` date relative to `now`.
///
/// Text that does not look relative is returned unchanged.
#[must_use]
pub fn convert_relative_date(text: &str, now: DateTime<FixedOffset>) -> String {
    static RELATIVE: OnceLock<Regex> = OnceLock::new();
    let relative = RELATIVE.get_or_init(|| {
        Regex::new(r"(\d+)\s*(secs?|seconds?|mins?|minutes?|hrs?|hours?|days?|weeks?|months?|years?)\s*ago")
            .expect("valid regex")
    });

    let lower = text.trim().to_lowercase();
    let Some(caps) = relative.captures(&lower) else {
        return text.trim().to_string();
    };
    let Ok(amount) = caps[1].parse::<i64>() else {
        return text.trim().to_string();
    };

    let unit = caps[2].trim_end_matches('s');
    let unit_seconds: i64 = match unit {
        "sec" | "second" => 1,
        "min" | "minute" => 60,
        "hr" | "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        "month" => 2_592_000,
        "year" => 31_536_000,
        _ => return text.trim().to_string(),
    };

    amount
        .checked_mul(unit_seconds)
        .and_then(ChronoDuration::try_seconds)
        .and_then(|ago| now.checked_sub_signed(ago))
        .map_or_else(|| text.trim().to_string(), |dt| dt.format(DATE_FORMAT).to_string())
}

fn normalize_gender(value: &str) -> &'static str {
    let lower = value.to_lowercase();
    if lower.contains("female") {
        "Female"
    } else if lower.contains("male") {
        "Male"
    } else {
        ""
    }
}

fn normalize_married(value: &str) -> &'static str {
    match value.trim().to_lowercase().as_str() {
        "yes" | "married" => "Yes",
        "no" | "single" | "unmarried" => "No",
        _ => "",
    }
}

fn is_unverified(html: &str, lower: &str) -> bool {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker =
        MARKER.get_or_init(|| Regex::new(r"(?i)>\s*unverified\s*user\s*<").expect("valid regex"));
    marker.is_match(html) || lower.contains("background:tomato")
}

fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn first_text(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let text = element_text(select_first(scope, sel)?);
        (!text.is_empty()).then_some(text)
    })
}

fn first_number(scope: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));

    selectors.iter().find_map(|sel| {
        let text = element_text(select_first(scope, sel)?);
        digits.find(&text).map(|m| m.as_str().to_string())
    })
}

/// Text of the first `span` sibling following the `<b>` label.
fn labelled_value(root: ElementRef<'_>, label: &str) -> Option<String> {
    let bold = Selector::parse("b").ok()?;
    root.select(&bold)
        .filter(|b| b.text().collect::<String>().contains(label))
        .find_map(|b| {
            b.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|sib| sib.value().name() == "span")
                .map(element_text)
        })
        .filter(|v| !v.is_empty())
}
