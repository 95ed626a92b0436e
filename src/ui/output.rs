use crate::collection::PropertyValue;
use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::BOOKS, text.style(theme().header.clone()));
}

/// Two-line banner: a title and a subtitle
pub fn banner(title: &str, subtitle: &str) {
    println!();
    println!("{} {}", Icons::ROCKET, title);
    println!("   {}", subtitle.style(theme().dim.clone()));
    println!();
}

pub fn status(icon: &str, label: &str, value: &str) {
    println!("{} {}: {}", icon, label.style(theme().dim.clone()), value);
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO.style(theme().info.clone()),
        label.style(theme().dim.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim.clone()).to_string()
}

pub fn muted(text: &str) -> String {
    text.style(theme().muted.clone()).to_string()
}

pub fn uri(text: &str) -> String {
    text.style(theme().resource.clone()).to_string()
}

/// One predicate line: `  predicate  value, value`
pub fn property(predicate: &str, values: &[PropertyValue]) {
    let rendered: Vec<String> = values
        .iter()
        .map(|value| match value {
            PropertyValue::Resource(resource) => uri(resource.as_str()),
            PropertyValue::Literal(literal) => format!("\"{}\"", literal).style(theme().literal.clone()).to_string(),
        })
        .collect();
    println!("  {} {}", predicate.style(theme().dim.clone()), rendered.join(", "));
}

pub fn phase(name: &str) {
    println!();
    println!(
        "{} {}",
        Icons::GEAR.style(theme().info.clone()),
        name.style(theme().header.clone())
    );
}

pub fn timing(elapsed: &str) {
    println!("{} {}", Icons::CLOCK.style(theme().dim.clone()), elapsed);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}
