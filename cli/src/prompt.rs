use std::io::{self, BufRead, Write};
use vauto_core::credentials::SecretCollector;
use vauto_core::reconcile::deploy::{Gate, InstancePlan};

/// Reads secrets from the terminal without echo.
pub struct TerminalCollector;

impl SecretCollector for TerminalCollector {
    fn read_secret(&self, prompt: &str) -> io::Result<String> {
        rpassword::prompt_password(format!("{prompt}: "))
    }
}

fn ask(question: &str) -> io::Result<String> {
    print!("{question} ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer)
}

pub fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn parse_gate(answer: &str) -> Gate {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Gate::Apply,
        "q" | "quit" => Gate::Quit,
        _ => Gate::Skip,
    }
}

/// Asks a yes/no question, defaulting to no.
pub fn confirm(question: &str) -> io::Result<bool> {
    ask(&format!("{question} [y/N]")).map(|answer| parse_confirmation(&answer))
}

/// Asks whether to apply one instance. An unreadable terminal stops the fleet.
pub fn instance_gate(instance: &InstancePlan) -> Gate {
    let question = match &instance.address {
        Some(address) => format!("Deploy {} ({address})? [y/N/q]", instance.name),
        None => format!("Deploy {}? [y/N/q]", instance.name),
    };
    ask(&question).map_or(Gate::Quit, |answer| parse_gate(&answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("y\n", true)]
    #[case(" YES ", true)]
    #[case("\n", false)]
    #[case("n", false)]
    #[case("yep", false)]
    fn test_parse_confirmation(#[case] answer: &str, #[case] expected: bool) {
        assert_eq!(parse_confirmation(answer), expected);
    }

    #[rstest]
    #[case("y", Gate::Apply)]
    #[case("q\n", Gate::Quit)]
    #[case("Quit", Gate::Quit)]
    #[case("", Gate::Skip)]
    #[case("no", Gate::Skip)]
    fn test_parse_gate(#[case] answer: &str, #[case] expected: Gate) {
        assert_eq!(parse_gate(answer), expected);
    }
}
