//! Reading `<img>` elements out of an HTML document.

use html5ever::{
    driver::{self, ParseOpts},
    tendril::TendrilSink,
    tree_builder::TreeBuilderOpts,
};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

lazy_static! {
    static ref IMG_SELECTOR: Selector = Selector::parse("img").unwrap();
    static ref LEADING_NUMBER: Regex = Regex::new(r"^\s*([0-9]*\.?[0-9]+)").unwrap();
    // Substring match: `line-height` and `max-height` count too, and the
    // first declaration wins.
    static ref STYLE_HEIGHT: Regex =
        Regex::new(r"(?i)height\s*:\s*([0-9]*\.?[0-9]+)px").unwrap();
}

/// The attributes of a single `<img>` element that the pipelines look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImgElement {
    pub src: Option<String>,
    pub height: Option<String>,
    pub style: Option<String>,
    pub class: Option<String>,
}

impl ImgElement {
    /// Height declared in markup, from the `height` attribute first and the
    /// inline style second. `None` means the markup does not say.
    pub fn declared_height(&self) -> Option<f64> {
        self.height
            .as_deref()
            .and_then(leading_number)
            .or_else(|| self.style.as_deref().and_then(style_height))
    }

    /// `src`, treating an empty attribute the same as a missing one.
    pub fn source(&self) -> Option<&str> {
        self.src.as_deref().filter(|src| !src.is_empty())
    }
}

/// Every `<img>` element in document order, including those inside
/// `<noscript>`.
pub fn parse_images(html: &str) -> Vec<ImgElement> {
    let document = parse_without_scripting(html);

    document
        .select(&IMG_SELECTOR)
        .map(|element| {
            let value = element.value();
            let attr = |name: &str| value.attr(name).map(str::to_owned);

            ImgElement {
                src: attr("src"),
                height: attr("height"),
                style: attr("style"),
                class: attr("class"),
            }
        })
        .collect()
}

// With scripting enabled html5ever treats `<noscript>` content as raw text.
fn parse_without_scripting(html: &str) -> Html {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };

    driver::parse_document(Html::new_document(), opts).one(html)
}

fn leading_number(value: &str) -> Option<f64> {
    let captures = LEADING_NUMBER.captures(value)?;
    captures[1].parse().ok()
}

fn style_height(style: &str) -> Option<f64> {
    let captures = STYLE_HEIGHT.captures(style)?;
    captures[1].parse().ok()
}
