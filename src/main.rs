//! Wagerbook command-line interface
//!
//! Operates directly on the configured store; every command prints its
//! result as JSON.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use wagerbook::{
    games::{rounds::parse_side, ControlUpdate, ForceResult},
    ledger::DEFAULT_LOG_LIMIT,
    matka::{BetRequest, BetType, Session},
    AccountId, Amount, GameKind, LogType, Outcome, ReportPeriod, Role, Selection, Symbol, TransferKind,
    WagerConfig, WagerCore, WagerError, WagerResult,
};

/// Wagering ledger and settlement engine
#[derive(Parser)]
#[command(name = "wagerbook")]
#[command(about = "Wallet ledger and game-round settlement engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the super admin, default games and matka markets
    Init {
        #[arg(long, default_value = "Super Admin")]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },

    /// Mint funds into an account (super admin only)
    Issue {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Amount,
    },

    /// Move funds between two accounts
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Amount,
        /// seed | withdraw | transfer
        #[arg(long, default_value = "seed")]
        kind: String,
        #[arg(long)]
        actor: String,
    },

    /// Show an account's balance
    Balance { account: String },

    /// Game catalog and outcome controls
    GameControl {
        #[command(subcommand)]
        action: GameAction,
    },

    /// Game rounds
    Round {
        #[command(subcommand)]
        action: RoundAction,
    },

    /// Matka markets
    Matka {
        #[command(subcommand)]
        action: MatkaAction,
    },

    /// Profit and loss over settled bets
    Report {
        /// daily | weekly | monthly | all
        #[arg(default_value = "all")]
        period: String,
        /// Show this account's bet history instead
        #[arg(long)]
        account: Option<String>,
    },

    /// Deposit or withdraw audit logs
    Logs {
        /// deposit | withdraw | account
        kind: String,
        #[arg(long)]
        actor: String,
        /// Narrow to entries involving this account
        #[arg(long)]
        party: Option<String>,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    Create {
        #[arg(long)]
        actor: String,
        /// admin | client | customer
        #[arg(long)]
        role: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// List accounts by role, or the children of a parent
    List {
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    Block {
        #[arg(long)]
        actor: String,
        target: String,
    },
    Unblock {
        #[arg(long)]
        actor: String,
        target: String,
    },
    /// Delete a customer, or a client with all its customers
    Delete {
        #[arg(long)]
        actor: String,
        target: String,
    },
}

#[derive(Subcommand)]
enum GameAction {
    List,
    Create {
        name: String,
    },
    Toggle {
        slug: String,
    },
    Set {
        slug: String,
        #[arg(long)]
        rtp: Option<u8>,
        /// WIN | LOSE | A | B | ANDAR | BAHAR
        #[arg(long)]
        force: Option<String>,
        /// Remove the current override
        #[arg(long, conflicts_with = "force")]
        clear_force: bool,
    },
    /// Enable or disable a game for one customer
    Customer {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum RoundAction {
    Open {
        game: String,
        /// Customer a picture round is opened for
        #[arg(long)]
        account: Option<String>,
    },
    Wager {
        #[arg(long)]
        account: String,
        #[arg(long)]
        round: String,
        /// Side (A, B, ANDAR, BAHAR) or comma-separated symbols
        #[arg(long)]
        pick: String,
        #[arg(long)]
        amount: Amount,
    },
    Close {
        round: String,
        /// Declared winner; the game's override still takes precedence
        #[arg(long)]
        winner: Option<String>,
    },
    Settle {
        round: String,
    },
    Show {
        round: String,
    },
    History {
        game: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum MatkaAction {
    Markets,
    Open {
        market: String,
    },
    Close {
        market: String,
    },
    CloseSession {
        market: String,
        /// OPEN | CLOSE
        session: String,
    },
    Bet {
        #[arg(long)]
        account: String,
        #[arg(long)]
        market: String,
        #[arg(long)]
        bet_type: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        session: String,
        #[arg(long)]
        amount: Amount,
    },
    Declare {
        market: String,
        /// e.g. 123-45-678
        result: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = WagerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_level.as_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(path = %config.storage.data_directory, backend = ?config.storage.backend, "Opening wagerbook");
    let core = WagerCore::open(config)?;
    run(&core, cli.command)?;
    Ok(())
}

fn print<T: Serialize>(value: &T) -> WagerResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn id(raw: &str) -> AccountId {
    AccountId::new(raw)
}

fn game_kind(raw: &str) -> WagerResult<GameKind> {
    GameKind::from_slug(raw).ok_or_else(|| WagerError::Validation(format!("unknown game '{}'", raw)))
}

fn parse_symbols(raw: &str) -> WagerResult<Vec<Symbol>> {
    raw.split(',')
        .map(|s| Symbol::parse(s).ok_or_else(|| WagerError::Validation(format!("unknown symbol '{}'", s))))
        .collect()
}

fn run(core: &WagerCore, command: Commands) -> WagerResult<()> {
    match command {
        Commands::Init { name, email } => print(&serde_json::json!({
            "super_admin": core.bootstrap(&name, &email)?.super_admin,
        })),

        Commands::Account { action } => run_account(core, action),

        Commands::Issue { actor, to, amount } => print(&core.transfers().issue(&id(&actor), &id(&to), amount)?),

        Commands::Transfer {
            from,
            to,
            amount,
            kind,
            actor,
        } => {
            let kind = match kind.to_ascii_lowercase().as_str() {
                "seed" => TransferKind::Seed,
                "withdraw" => TransferKind::Withdraw,
                "transfer" => TransferKind::Transfer,
                other => return Err(WagerError::Validation(format!("unknown transfer kind '{}'", other))),
            };
            print(&core.transfers().transfer(&id(&from), &id(&to), amount, kind, &id(&actor))?)
        }

        Commands::Balance { account } => {
            let wallet = core.ledger().wallet(&id(&account))?;
            print(&serde_json::json!({
                "account": wallet.account,
                "balance": wallet.balance.to_string(),
                "updated_at": wallet.updated_at,
            }))
        }

        Commands::GameControl { action } => run_game(core, action),
        Commands::Round { action } => run_round(core, action),
        Commands::Matka { action } => run_matka(core, action),

        Commands::Report { period, account } => match account {
            Some(account) => print(&core.reports().bets_for(&id(&account), DEFAULT_LOG_LIMIT)?),
            None => {
                let period = ReportPeriod::parse(&period)
                    .ok_or_else(|| WagerError::Validation(format!("unknown period '{}'", period)))?;
                print(&core.reports().profit_loss(period)?)
            }
        },

        Commands::Logs { kind, actor, party } => {
            let party = party.as_deref().map(id);
            match kind.to_ascii_lowercase().as_str() {
                "deposit" => print(&core.transfers().deposit_logs(&id(&actor), party.as_ref())?),
                "withdraw" => print(&core.transfers().withdraw_logs(&id(&actor), party.as_ref())?),
                "account" => print(&core.ledger().entries_for(&id(&actor), DEFAULT_LOG_LIMIT)?),
                other => Err(WagerError::Validation(format!(
                    "unknown log '{}', expected {}, {} or account",
                    other,
                    LogType::Deposit,
                    LogType::Withdraw
                ))),
            }
        }
    }
}

fn run_account(core: &WagerCore, action: AccountAction) -> WagerResult<()> {
    let accounts = core.accounts();
    match action {
        AccountAction::Create {
            actor,
            role,
            name,
            email,
        } => {
            let role = Role::parse(&role).ok_or_else(|| WagerError::Validation(format!("unknown role '{}'", role)))?;
            print(&accounts.create_account(&id(&actor), role, &name, &email)?)
        }
        AccountAction::List { role, parent } => match (role, parent) {
            (_, Some(parent)) => print(&accounts.children(&id(&parent))?),
            (Some(role), None) => {
                let role =
                    Role::parse(&role).ok_or_else(|| WagerError::Validation(format!("unknown role '{}'", role)))?;
                print(&accounts.list_by_role(role)?)
            }
            (None, None) => Err(WagerError::Validation("pass --role or --parent".to_string())),
        },
        AccountAction::Block { actor, target } => print(&accounts.set_active(&id(&actor), &id(&target), false)?),
        AccountAction::Unblock { actor, target } => print(&accounts.set_active(&id(&actor), &id(&target), true)?),
        AccountAction::Delete { actor, target } => {
            let account = accounts.get(&id(&target))?;
            let summary = match account.role {
                Role::Client => accounts.delete_client(&id(&actor), &account.id)?,
                _ => accounts.delete_customer(&id(&actor), &account.id)?,
            };
            print(&summary)
        }
    }
}

fn run_game(core: &WagerCore, action: GameAction) -> WagerResult<()> {
    let catalog = core.catalog();
    match action {
        GameAction::List => print(&catalog.list()?),
        GameAction::Create { name } => print(&catalog.create_game(&name)?),
        GameAction::Toggle { slug } => print(&catalog.toggle(&slug)?),
        GameAction::Set {
            slug,
            rtp,
            force,
            clear_force,
        } => {
            let force_result = match (force, clear_force) {
                (_, true) => Some(None),
                (Some(raw), false) => Some(Some(
                    ForceResult::parse(&raw)
                        .ok_or_else(|| WagerError::Validation(format!("unknown force result '{}'", raw)))?,
                )),
                (None, false) => None,
            };
            print(&catalog.set_control(&slug, ControlUpdate { rtp, force_result })?)
        }
        GameAction::Customer {
            actor,
            customer,
            slug,
            enabled,
        } => print(&catalog.set_customer_game_enabled(&id(&actor), &id(&customer), &slug, enabled)?),
    }
}

fn run_round(core: &WagerCore, action: RoundAction) -> WagerResult<()> {
    let rounds = core.rounds();
    match action {
        RoundAction::Open { game, account } => {
            let kind = game_kind(&game)?;
            match account {
                Some(account) => print(&rounds.open_personal_round(kind, &id(&account))?),
                None => print(&rounds.open_round(kind)?),
            }
        }
        RoundAction::Wager {
            account,
            round,
            pick,
            amount,
        } => {
            let kind = rounds.get(&round)?.game;
            let selection = if kind.single_active_round() {
                Selection::Side(parse_side(kind, &pick)?)
            } else {
                Selection::Symbols(parse_symbols(&pick)?)
            };
            print(&rounds.place_wager(&id(&account), &round, selection, amount)?)
        }
        RoundAction::Close { round, winner } => {
            let declared = match winner {
                None => None,
                Some(raw) => {
                    let kind = rounds.get(&round)?.game;
                    Some(if kind.single_active_round() {
                        Outcome::Side(parse_side(kind, &raw)?)
                    } else {
                        let symbol = Symbol::parse(&raw)
                            .ok_or_else(|| WagerError::Validation(format!("unknown symbol '{}'", raw)))?;
                        Outcome::Symbol(symbol)
                    })
                }
            };
            print(&rounds.close_round(&round, declared)?)
        }
        RoundAction::Settle { round } => print(&rounds.settle(&round)?),
        RoundAction::Show { round } => print(&serde_json::json!({
            "round": rounds.get(&round)?,
            "wagers": rounds.wagers(&round)?,
        })),
        RoundAction::History { game, limit } => print(&rounds.history(game_kind(&game)?, limit)?),
    }
}

fn run_matka(core: &WagerCore, action: MatkaAction) -> WagerResult<()> {
    let matka = core.matka();
    let session = |raw: &str| {
        Session::parse(raw).ok_or_else(|| WagerError::Validation(format!("unknown session '{}'", raw)))
    };
    match action {
        MatkaAction::Markets => print(&matka.markets()?),
        MatkaAction::Open { market } => print(&matka.open_market(&market)?),
        MatkaAction::Close { market } => print(&matka.close_market(&market)?),
        MatkaAction::CloseSession { market, session: raw } => print(&matka.close_session(&market, session(&raw)?)?),
        MatkaAction::Bet {
            account,
            market,
            bet_type,
            number,
            session: raw,
            amount,
        } => {
            let bet_type = BetType::parse(&bet_type)
                .ok_or_else(|| WagerError::Validation(format!("unknown bet type '{}'", bet_type)))?;
            let request = BetRequest {
                bet_type,
                number,
                session: session(&raw)?,
                amount,
            };
            print(&matka.place_bets(&id(&account), &market, vec![request])?)
        }
        MatkaAction::Declare { market, result } => print(&matka.declare_result(&market, &result)?),
    }
}
