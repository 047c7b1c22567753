//! Terminal front end for the setup flow.
//!
//! Renders each setup step as a prompt on stdout and reads the answer from
//! stdin. Choices can be given by number or by name.

use fuel_core::{SetupError, SetupFlow, SetupInput, SetupOutcome, SetupStep};
use fuel_types::{ProductSelection, SecretString};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub struct Prompt {
	lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
	pub fn new() -> Self {
		Self {
			lines: BufReader::new(tokio::io::stdin()).lines(),
		}
	}

	/// Prints a question and reads one trimmed line.
	pub async fn ask(&mut self, question: &str) -> Result<String, Box<dyn std::error::Error>> {
		print!("{}: ", question);
		std::io::stdout().flush()?;
		match self.lines.next_line().await? {
			Some(line) => Ok(line.trim().to_string()),
			None => Err("Input closed".into()),
		}
	}
}

/// Drives a setup flow to completion.
pub async fn run_flow(
	flow: &mut SetupFlow,
	prompt: &mut Prompt,
	api_key: Option<SecretString>,
) -> Result<SetupOutcome, Box<dyn std::error::Error>> {
	let mut api_key = api_key;

	loop {
		let input = match flow.step() {
			SetupStep::Done(outcome) => return Ok(outcome.clone()),
			SetupStep::Aborted(reason) => return Err(format!("Setup aborted: {}", reason).into()),
			SetupStep::ApiKey => match api_key.take() {
				Some(key) => SetupInput::ApiKey(key),
				None => SetupInput::ApiKey(SecretString::new(prompt.ask("API key").await?)),
			},
			SetupStep::CompanySelection { companies } => {
				print_choices("Companies", companies.iter().map(String::as_str));
				let answer = prompt.ask("Company").await?;
				SetupInput::Company(pick(&answer, companies.iter().map(String::as_str)))
			},
			SetupStep::StationSelection { company, stations } => {
				print_choices(
					&format!("Stations of {}", company),
					stations.iter().map(|s| s.name.as_str()),
				);
				let answer = prompt.ask("Station").await?;
				SetupInput::Station(pick(&answer, stations.iter().map(|s| s.name.as_str())))
			},
			SetupStep::ProductSelection {
				station,
				available,
				defaults,
			} => {
				println!("Products at {}:", station.title());
				for (index, product) in available.iter().enumerate() {
					let mark = if defaults.is_selected(product) { "x" } else { " " };
					println!("  {:>2}. [{}] {}", index + 1, mark, product);
				}
				let answer = prompt
					.ask("Products to track (comma separated, empty keeps [x])")
					.await?;
				SetupInput::Products(parse_products(&answer, available, defaults))
			},
		};

		match flow.submit(input).await {
			Ok(_) => {},
			Err(SetupError::InvalidInput(message)) => println!("{}", message),
			Err(e) => return Err(e.into()),
		}
	}
}

fn print_choices<'a>(title: &str, choices: impl Iterator<Item = &'a str>) {
	println!("{}:", title);
	for (index, choice) in choices.enumerate() {
		println!("  {:>2}. {}", index + 1, choice);
	}
}

/// Resolves a 1-based index to its choice; anything else is taken literally.
fn pick<'a>(answer: &str, mut choices: impl Iterator<Item = &'a str>) -> String {
	answer
		.parse::<usize>()
		.ok()
		.and_then(|index| index.checked_sub(1))
		.and_then(|index| choices.nth(index))
		.unwrap_or(answer)
		.to_string()
}

fn parse_products(answer: &str, available: &[String], defaults: &ProductSelection) -> ProductSelection {
	if answer.is_empty() {
		return defaults.clone();
	}

	let chosen: Vec<String> = answer
		.split(',')
		.map(str::trim)
		.filter(|part| !part.is_empty())
		.map(|part| pick(part, available.iter().map(String::as_str)))
		.collect();

	let mut selection: ProductSelection = available
		.iter()
		.map(|product| (product.clone(), chosen.contains(product)))
		.collect();
	// Unknown names are passed on so the flow can reject them.
	for product in chosen.iter().filter(|p| !available.contains(p)) {
		selection.set(product.clone(), true);
	}
	selection
}
