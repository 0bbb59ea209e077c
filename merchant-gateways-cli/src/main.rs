//! `gatewayctl`: run payment operations against a configured gateway.
//!
//! The gateway is described by a TOML file (see
//! [`GatewayConfig`](merchant_gateways::gateway::GatewayConfig)). Every
//! command prints the gateway response as JSON on stdout; logs go to stderr.
//!
//! Exit codes: `0` approved, `1` declined, `2` error.

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use merchant_gateways::{
    error::{GatewayError, Result},
    gateway::{
        Gateway, GatewayConfig,
        registry::{available_gateways, build_gateway, build_transport},
    },
    money::{Currency, Money},
    payment::{Check, CreditCard, PaymentSource, TransactionOptions},
    response::Response,
};
use tracing::{debug, error};

mod observability;

use observability::{LogFormat, init_observability};

const EXIT_DECLINED: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "gatewayctl", version, about = "Run payment operations against a payment gateway")]
struct Cli {
    /// Gateway configuration file (TOML).
    #[arg(short, long, env = "GATEWAYCTL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format; overrides `LOG_FORMAT`.
    #[arg(long, value_parser = ["pretty", "json"], global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List available gateways and the operations they support.
    List,
    /// Authorize and capture in one step.
    Purchase {
        #[command(flatten)]
        amount: AmountArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Reserve funds for a later capture.
    Authorize {
        #[command(flatten)]
        amount: AmountArgs,
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Settle an authorization.
    Capture {
        /// Authorization returned by `authorize`.
        #[arg(long)]
        authorization: String,
        #[command(flatten)]
        amount: AmountArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Refund a settled transaction.
    Refund {
        /// Authorization of the transaction to refund.
        #[arg(long)]
        authorization: String,
        #[command(flatten)]
        amount: AmountArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Cancel an unsettled transaction.
    Void {
        /// Authorization of the transaction to cancel.
        #[arg(long)]
        authorization: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Save a payment source in the gateway vault.
    Store {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Remove a vaulted payment source.
    Unstore {
        /// Token returned by `store`.
        #[arg(long)]
        token: String,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Check a card without leaving a charge behind.
    Verify {
        #[command(flatten)]
        card: CardArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Debug, Args)]
struct AmountArgs {
    /// Amount in major units, e.g. `10.00`.
    #[arg(long)]
    amount: String,
    /// ISO 4217 currency code.
    #[arg(long, default_value = "USD")]
    currency: String,
}

impl AmountArgs {
    fn money(&self) -> Result<Money> {
        Money::from_major(&self.amount, Currency::new(&self.currency)?)
    }
}

#[derive(Debug, Args)]
struct CardArgs {
    /// Card number.
    #[arg(long)]
    card: Option<String>,
    /// Expiry month (1-12).
    #[arg(long, requires = "card")]
    month: Option<u32>,
    /// Four-digit expiry year.
    #[arg(long, requires = "card")]
    year: Option<i32>,
    /// Card verification value.
    #[arg(long, requires = "card")]
    cvv: Option<String>,
    /// Card holder's first name.
    #[arg(long)]
    first_name: Option<String>,
    /// Card holder's last name.
    #[arg(long)]
    last_name: Option<String>,
}

impl CardArgs {
    fn credit_card(&self) -> Result<CreditCard> {
        let (Some(number), Some(month), Some(year)) = (&self.card, self.month, self.year) else {
            return Err(GatewayError::InvalidInput(
                "--card, --month and --year are required".to_owned(),
            ));
        };
        let mut card = CreditCard::new(number, month, year).with_name(
            self.first_name.clone().unwrap_or_default(),
            self.last_name.clone().unwrap_or_default(),
        );
        if let Some(cvv) = &self.cvv {
            card = card.with_cvv(cvv);
        }
        Ok(card)
    }
}

#[derive(Debug, Args)]
struct SourceArgs {
    #[command(flatten)]
    card: CardArgs,
    /// Vaulted token instead of a card.
    #[arg(long, conflicts_with_all = ["card", "routing_number"])]
    token: Option<String>,
    /// Bank routing number, for an ACH debit instead of a card.
    #[arg(long, requires = "account_number", conflicts_with = "card")]
    routing_number: Option<String>,
    /// Bank account number.
    #[arg(long, requires = "routing_number")]
    account_number: Option<String>,
    /// Bank account holder name.
    #[arg(long, default_value = "")]
    account_name: String,
}

impl SourceArgs {
    fn payment_source(&self) -> Result<PaymentSource> {
        if let Some(token) = &self.token {
            return Ok(PaymentSource::token(token));
        }
        if let (Some(routing), Some(account)) = (&self.routing_number, &self.account_number) {
            return Ok(PaymentSource::Check(Check::new(&self.account_name, routing, account)));
        }
        Ok(PaymentSource::Card(self.card.credit_card()?))
    }
}

#[derive(Debug, Args)]
struct OptionArgs {
    /// Merchant order reference.
    #[arg(long)]
    order_id: Option<String>,
    /// Free-text description.
    #[arg(long)]
    description: Option<String>,
    /// Customer email.
    #[arg(long)]
    email: Option<String>,
    /// Customer IP address.
    #[arg(long)]
    ip: Option<String>,
    /// Idempotency key for gateways that honor one.
    #[arg(long)]
    idempotency_key: Option<String>,
    /// Gateway-specific option, `key=value`; may repeat.
    #[arg(long = "extra", value_parser = parse_key_value)]
    extra: Vec<(String, String)>,
}

impl OptionArgs {
    fn options(&self) -> TransactionOptions {
        let mut options = TransactionOptions::new();
        options.order_id.clone_from(&self.order_id);
        options.description.clone_from(&self.description);
        options.email.clone_from(&self.email);
        options.ip.clone_from(&self.ip);
        options.idempotency_key.clone_from(&self.idempotency_key);
        for (key, value) in &self.extra {
            options = options.with_extra(key, value);
        }
        options
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn load_gateway(config: Option<&PathBuf>) -> Result<Box<dyn Gateway>> {
    let path = config.ok_or_else(|| {
        GatewayError::ConfigError(
            "no configuration given; pass --config or set GATEWAYCTL_CONFIG".to_owned(),
        )
    })?;
    let config = GatewayConfig::from_file(path)?;
    debug!(gateway = %config.gateway, test = config.test, "Loaded configuration");
    let transport = build_transport(&config)?;
    build_gateway(&config, transport)
}

async fn run(cli: &Cli) -> Result<Option<Response>> {
    if matches!(cli.command, Command::List) {
        let listing = serde_json::to_string_pretty(available_gateways()).map_err(|e| {
            GatewayError::InvalidResponse { gateway: "gatewayctl", message: e.to_string() }
        })?;
        println!("{listing}");
        return Ok(None);
    }

    let gateway = load_gateway(cli.config.as_ref())?;
    let response = match &cli.command {
        Command::List => return Ok(None),
        Command::Purchase { amount, source, options } => {
            let source = source.payment_source()?;
            gateway.purchase(&amount.money()?, &source, &options.options()).await?
        }
        Command::Authorize { amount, source, options } => {
            let source = source.payment_source()?;
            gateway.authorize(&amount.money()?, &source, &options.options()).await?
        }
        Command::Capture { authorization, amount, options } => {
            gateway.capture(&amount.money()?, authorization, &options.options()).await?
        }
        Command::Refund { authorization, amount, options } => {
            gateway.refund(&amount.money()?, authorization, &options.options()).await?
        }
        Command::Void { authorization, options } => {
            gateway.void(authorization, &options.options()).await?
        }
        Command::Store { source, options } => {
            gateway.store(&source.payment_source()?, &options.options()).await?
        }
        Command::Unstore { token, options } => gateway.unstore(token, &options.options()).await?,
        Command::Verify { card, options } => {
            gateway.verify(&card.credit_card()?, &options.options()).await?
        }
    };
    Ok(Some(response))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.log_format.as_deref().map_or_else(LogFormat::from_env, LogFormat::parse);
    init_observability(format);

    match run(&cli).await {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(response)) => {
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(e) => error!(error = %e, "Cannot serialize response"),
            }
            if response.success { ExitCode::SUCCESS } else { ExitCode::from(EXIT_DECLINED) }
        }
        Err(e) => {
            error!(error = %e, "Operation failed");
            eprintln!("error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
