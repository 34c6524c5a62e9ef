//! Built-in field tables for profile pages
//!
//! Profile pages render contact details as an icon followed by a text block.
//! Each field is first looked up by the intro-card icon image, then by the
//! sprite offset used on the about tab.

use crate::extract::rules::{FieldRule, FieldSource};
use crate::ConfigError;

fn intro_icon(image: &str) -> String {
    format!("img[src*='{}']", image)
}

fn about_icon(offset: &str) -> String {
    format!("i[data-visualcompletion='css-img'][style*='{}']", offset)
}

fn icon_rule(
    name: &str,
    image: &str,
    offset: &str,
    source: FieldSource,
) -> Result<FieldRule, ConfigError> {
    let intro = intro_icon(image);
    let about = about_icon(offset);
    FieldRule::new(name, &[intro.as_str(), about.as_str()], source)
}

fn title() -> Result<FieldRule, ConfigError> {
    FieldRule::new("title", &["h1"], FieldSource::FirstText)
}

fn logo() -> Result<FieldRule, ConfigError> {
    FieldRule::new(
        "logo",
        &["svg image"],
        FieldSource::Attr("xlink:href".to_string()),
    )
}

fn description(field: &str) -> Result<FieldRule, ConfigError> {
    FieldRule::new(
        field,
        &[
            "div[class*='xieb3on'] > div:first-child",
            "div[class*='xdppsyt']",
        ],
        FieldSource::Text,
    )
}

fn contact_rules() -> Result<Vec<FieldRule>, ConfigError> {
    Ok(vec![
        icon_rule("address", "8k_Y-oVxbuU.png", "-84px -126px", FieldSource::SiblingText)?,
        icon_rule("phone", "Dc7-7AgwkwS.png", "-63px -126px", FieldSource::SiblingText)?,
        icon_rule("email", "2PIcyqpptfD.png", "0px -155px", FieldSource::SiblingText)?,
    ])
}

/// Field table for the business flow
///
/// # Arguments
///
/// * `description_field` - Name the description is stored under
pub fn business_table(description_field: &str) -> Result<Vec<FieldRule>, ConfigError> {
    let mut rules = vec![title()?, logo()?, description(description_field)?];
    rules.extend(contact_rules()?);
    rules.extend([
        icon_rule(
            "web",
            "BQdeC67wT9z.png",
            "0px -260px",
            FieldSource::SiblingLinkParam("u".to_string()),
        )?,
        icon_rule("category", "4PEEs7qlhJk.png", "0px -42px", FieldSource::SiblingText)?
            .removing(r"Page\s*·")?,
        icon_rule("price_range", "vUmfhJXfJ5R.png", "0px -134px", FieldSource::SiblingText)?
            .capturing(r"\$+")?,
        FieldRule::new("service", &[intro_icon("arM1m3sNXPr.png").as_str()], FieldSource::SiblingText)?,
        FieldRule::new("rating", &[intro_icon("4Lea07Woawi.png").as_str()], FieldSource::SiblingText)?
            .capturing(r"(\d+(?:\.\d+)?)")?,
        FieldRule::new(
            "likes",
            &["div[role='main'] a[href*='_like']"],
            FieldSource::Text,
        )?
        .removing(r"(?i)likes?")?,
        FieldRule::new(
            "followers",
            &["div[role='main'] a[href*='follower']"],
            FieldSource::Text,
        )?
        .removing(r"(?i)followers?")?,
    ]);
    Ok(rules)
}

/// Field table for the web flow
///
/// The identity field is not extracted here: web records keep the address
/// they were queued with.
pub fn web_table(description_field: &str) -> Result<Vec<FieldRule>, ConfigError> {
    let mut rules = vec![title()?, logo()?, description(description_field)?];
    rules.extend(contact_rules()?);
    Ok(rules)
}
