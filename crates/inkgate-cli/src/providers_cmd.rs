//! `inkgate providers` — list the provider registry.

use colored::Colorize;

use inkgate_core::config::load_config;
use inkgate_providers::registry::CredentialShape;
use inkgate_providers::PROVIDERS;

/// Print every supported provider with its defaults and the labels that map to it.
pub fn run() {
    let config = load_config(None);

    println!();
    println!("{}", "Supported providers".cyan().bold());
    println!();
    for spec in PROVIDERS {
        let mut labels: Vec<&str> = config
            .aliases
            .iter()
            .filter(|(_, id)| id.as_str() == spec.id)
            .map(|(label, _)| label.as_str())
            .collect();
        labels.sort_unstable();

        println!(
            "  {:<10} {} {}",
            spec.id.bold(),
            spec.display_name,
            format!("({})", spec.family.label()).dimmed()
        );
        println!("  {:<10} model: {}", "", spec.default_model.dimmed());
        println!("  {:<10} url:   {}", "", spec.default_base_url.dimmed());
        if spec.credential == CredentialShape::KeyAndSecret {
            println!("  {:<10} {}", "", "key format: API_KEY,SECRET_KEY".yellow());
        }
        if !labels.is_empty() {
            println!("  {:<10} aliases: {}", "", labels.join(", ").dimmed());
        }
    }
    println!();
}
