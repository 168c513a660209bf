//! Command-line surface of the `zerocoin` binary.
//!
//! Wallet and statement files live wherever the user points; the ledger itself
//! lives in the backend named by the configuration.

use crate::blockchain::{Admission, Blockchain};
use crate::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use crate::error::ChainError;
use crate::store::block_name;
use crate::transaction::{timestamp_now, Statement};
use crate::wallet::Wallet;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "zerocoin", author, version, about = "A single-node proof-of-work ledger", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Prints the name of the currency
    Name,
    /// Creates the genesis block
    Genesis,
    /// Generates a new wallet file
    Generate { wallet: PathBuf },
    /// Prints the tag of a wallet
    Address { wallet: PathBuf },
    /// Writes an unsigned funding statement from the issuer
    Fund {
        tag: String,
        amount: u64,
        statement: PathBuf,
    },
    /// Writes a signed transfer statement
    Transfer {
        wallet: PathBuf,
        to: String,
        amount: u64,
        statement: PathBuf,
    },
    /// Prints the balance of a wallet tag, pending transactions included
    Balance { tag: String },
    /// Verifies a statement and adds it to the mempool
    Verify { wallet: PathBuf, statement: PathBuf },
    /// Seals the mempool into a new block
    Mine { difficulty: Option<usize> },
    /// Checks the hash links of the whole chain
    Validate,
}

/// Loads the configuration at `path` and opens the ledger it names.
pub fn load_blockchain_from_config(path: &Path) -> Result<(Config, Blockchain), ChainError> {
    let config = load_config(path)?;
    let chain = Blockchain::open(config.clone())?;
    Ok((config, chain))
}

pub fn run(cli: &Cli) -> Result<(), ChainError> {
    match &cli.command {
        Commands::Name => {
            let config = load_config(&cli.config)?;
            println!("{}", config.ledger.name);
        }
        Commands::Genesis => {
            let (_, chain) = load_blockchain_from_config(&cli.config)?;
            chain.create_genesis()?;
            println!(
                "{} '{}'",
                "Genesis block created in".bright_green(),
                block_name(0)
            );
        }
        Commands::Generate { wallet } => {
            let generated = Wallet::generate()?;
            generated.save(wallet)?;
            println!(
                "New wallet generated in '{}' with tag {}",
                wallet.display(),
                generated.tag()?.bright_yellow()
            );
        }
        Commands::Address { wallet } => {
            println!("{}", Wallet::load(wallet)?.tag()?);
        }
        Commands::Fund {
            tag,
            amount,
            statement,
        } => {
            let config = load_config(&cli.config)?;
            let timestamp = timestamp_now();
            let funding = Statement::funding(&config.ledger.issuer, tag, *amount, &timestamp);
            write_statement(statement, &funding)?;
            println!(
                "Funded wallet {} with {} {}s on {}",
                tag.bright_yellow(),
                amount,
                config.ledger.name,
                timestamp
            );
        }
        Commands::Transfer {
            wallet,
            to,
            amount,
            statement,
        } => {
            let keypair = Wallet::load(wallet)?.keypair()?;
            let timestamp = timestamp_now();
            let transfer = Statement::signed_transfer(&keypair, to, *amount, &timestamp)?;
            write_statement(statement, &transfer)?;
            println!(
                "Transferred {} from {} to {} and the statement to '{}' on {}",
                amount,
                wallet.display(),
                to.bright_yellow(),
                statement.display(),
                timestamp
            );
        }
        Commands::Balance { tag } => {
            let (_, chain) = load_blockchain_from_config(&cli.config)?;
            println!("{}", chain.balance(tag)?);
        }
        Commands::Verify { wallet, statement } => {
            let public_key = Wallet::load(wallet)?.public_key()?;
            let text = fs::read_to_string(statement)?;
            let (_, chain) = load_blockchain_from_config(&cli.config)?;
            match chain.verify_and_admit(&public_key, &text)? {
                Admission::UnsignedFunding(_) => println!(
                    "{}",
                    "Any funding request (i.e., from the issuer) is considered valid; written to the mempool"
                        .bright_green()
                ),
                Admission::VerifiedTransfer(_) => println!(
                    "{} '{}' with wallet '{}' is valid, and was written to the mempool",
                    "The transaction in file".bright_green(),
                    statement.display(),
                    wallet.display()
                ),
            }
        }
        Commands::Mine { difficulty } => {
            let (config, chain) = load_blockchain_from_config(&cli.config)?;
            let difficulty = difficulty.unwrap_or(config.miner.default_difficulty);
            mine(&chain, difficulty)?;
        }
        Commands::Validate => {
            let (_, chain) = load_blockchain_from_config(&cli.config)?;
            println!("{}", if chain.validate()? { "True" } else { "False" });
        }
    }
    Ok(())
}

fn mine(chain: &Blockchain, difficulty: usize) -> Result<(), ChainError> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Mining at difficulty {}", difficulty));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let start = Instant::now();
    let sealed = chain.mine(difficulty);
    spinner.finish_and_clear();
    let sealed = sealed?;

    println!(
        "Mempool transactions moved to {} and mined with difficulty {} and nonce {}",
        block_name(sealed.number).bright_cyan(),
        difficulty,
        sealed.block.nonce
    );
    tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, hash = %sealed.hash, "mine finished");
    Ok(())
}

fn write_statement(path: &Path, statement: &Statement) -> Result<(), ChainError> {
    fs::write(path, statement.render()).map_err(|e| {
        ChainError::IoError(format!("Failed to write statement {}: {}", path.display(), e))
    })
}

/// User-facing text for a failed command.
pub fn describe_error(command: &Commands, error: &ChainError) -> String {
    match (command, error) {
        (Commands::Verify { statement, .. }, ChainError::MalformedStatement(_)) => {
            format!("Invalid transaction format in '{}'", statement.display())
        }
        (Commands::Verify { statement, .. }, ChainError::InsufficientFunds { .. }) => {
            format!("Insufficient funds for transaction in '{}'", statement.display())
        }
        (Commands::Verify { statement, .. }, ChainError::InvalidSignature(_)) => format!(
            "Invalid signature or verification error for '{}': {}",
            statement.display(),
            error
        ),
        _ => format!("Error: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_in(dir: &TempDir, args: &[&str]) -> Cli {
        let config = dir.path().join("config.toml");
        fs::write(
            &config,
            format!("[ledger]\npath = \"{}\"\n", dir.path().display()),
        )
        .unwrap();
        let mut argv = vec!["zerocoin", "--config", config.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["zerocoin", "mine"]).unwrap();
        assert_eq!(cli.command, Commands::Mine { difficulty: None });
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        let cli = Cli::try_parse_from(["zerocoin", "fund", "abc", "100", "s.txt"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fund {
                tag: "abc".to_string(),
                amount: 100,
                statement: PathBuf::from("s.txt"),
            }
        );
    }

    #[test]
    fn test_parse_rejects_negative_amount() {
        assert!(Cli::try_parse_from(["zerocoin", "fund", "abc", "-5", "s.txt"]).is_err());
        assert!(Cli::try_parse_from(["zerocoin", "transfer", "w", "abc"]).is_err());
    }

    #[test]
    fn test_fund_verify_mine_flow() {
        let dir = TempDir::new().unwrap();
        let wallet = dir.path().join("alice.json");
        let statement = dir.path().join("fund.txt");
        let wallet_arg = wallet.to_str().unwrap();
        let statement_arg = statement.to_str().unwrap();

        run(&cli_in(&dir, &["genesis"])).unwrap();
        run(&cli_in(&dir, &["generate", wallet_arg])).unwrap();
        let tag = Wallet::load(&wallet).unwrap().tag().unwrap();

        run(&cli_in(&dir, &["fund", &tag, "100", statement_arg])).unwrap();
        run(&cli_in(&dir, &["verify", wallet_arg, statement_arg])).unwrap();
        run(&cli_in(&dir, &["mine", "1"])).unwrap();

        assert!(dir.path().join("block_1.txt").exists());
        assert!(!dir.path().join("mempool.txt").exists());

        let (_, chain) = load_blockchain_from_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(chain.balance(&tag).unwrap(), 100);
        assert!(chain.validate().unwrap());
    }

    #[test]
    fn test_describe_verify_errors() {
        let verify = Commands::Verify {
            wallet: PathBuf::from("w.json"),
            statement: PathBuf::from("s.txt"),
        };
        let funds = ChainError::InsufficientFunds {
            sender: "a".to_string(),
            balance: 0,
            requested: 5,
        };
        assert_eq!(
            describe_error(&verify, &funds),
            "Insufficient funds for transaction in 's.txt'"
        );
        assert!(describe_error(&Commands::Validate, &funds).starts_with("Error: "));
    }
}
