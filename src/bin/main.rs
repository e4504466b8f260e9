use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use console::{style, Term};
use rentpay::core::flow::FlowState;
use rentpay::core::history::{export_csv, export_file_name, HistoryFilter, HistoryStats};
use rentpay::core::reports::Report;
use rentpay::observability::{init_logging, FlowContext, LoggingConfig};
use rentpay::types::format_inr;
use rentpay::{
    BuyerInfo, CheckoutOptions, CheckoutOutcome, CheckoutProof, CheckoutWidget, Config,
    HttpBackend, PaymentBackend, PaymentIntent, PaymentMethod, PaymentStatus, RentPay,
    ScriptInjector,
};
use tracing::{info, warn};

#[derive(Parser)]
#[clap(version, about = "Pay rent online or in cash and track the payment")]
struct Cli {
    /// Configuration file (created with defaults when missing)
    #[clap(long, env = "RENTPAY_CONFIG", default_value = "rentpay.toml")]
    config: PathBuf,

    /// Backend API base URL (overrides config)
    #[clap(long, env = "RENTPAY_API_URL")]
    api_url: Option<String>,

    /// Bearer token (overrides config)
    #[clap(long, env = "RENTPAY_AUTH_TOKEN")]
    token: Option<String>,

    /// Correlation id attached to every request of this run
    #[clap(long)]
    correlation_id: Option<String>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a rent payment and see it through to confirmation
    Pay {
        /// Room to pay for; defaults to the tenant's own room
        #[clap(long)]
        room: Option<String>,
        /// Amount in rupees; defaults to the monthly rent
        #[clap(long)]
        amount: Option<i64>,
        /// Billing month as YYYY-MM; defaults to the current month
        #[clap(long)]
        month: Option<String>,
        /// online or cash
        #[clap(long)]
        method: PaymentMethod,
        #[clap(long)]
        notes: Option<String>,
        #[clap(long)]
        accept_terms: bool,
        #[clap(long, env = "RENTPAY_TENANT_NAME")]
        name: String,
        #[clap(long, env = "RENTPAY_TENANT_EMAIL")]
        email: String,
        #[clap(long, env = "RENTPAY_TENANT_PHONE")]
        phone: Option<String>,
    },
    /// Show the current state of a payment
    Status { payment_id: String },
    /// Cancel a pending cash payment
    Cancel {
        payment_id: String,
        /// Skip the confirmation prompt
        #[clap(long)]
        yes: bool,
    },
    /// List the tenant's payments
    History {
        #[clap(long)]
        search: Option<String>,
        #[clap(long)]
        status: Option<PaymentStatus>,
        #[clap(long)]
        method: Option<PaymentMethod>,
        /// Write the filtered rows as CSV; without a value a dated file name
        /// is used
        #[clap(long)]
        export: Option<Option<PathBuf>>,
    },
    /// Print the receipt for a settled payment
    Receipt { payment_id: String },
    /// Administrator revenue and occupancy overview
    Report,
    /// Administrator: record cash received for a payment
    ConfirmCash {
        payment_id: String,
        #[clap(long)]
        notes: Option<String>,
    },
}

/// Fetches the gateway script once so a broken CDN shows up before checkout
struct HttpScriptInjector {
    http_client: reqwest::Client,
}

#[async_trait]
impl ScriptInjector for HttpScriptInjector {
    async fn inject(&self, script_url: &str) -> Result<()> {
        let response = self.http_client.get(script_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("script request returned {}", response.status());
        }
        Ok(())
    }
}

/// Checkout on a terminal: show the order and read back the gateway proof
struct TerminalCheckout;

#[async_trait]
impl CheckoutWidget for TerminalCheckout {
    async fn open(&self, options: &CheckoutOptions) -> Result<CheckoutOutcome> {
        let term = Term::stdout();
        term.write_line(&format!(
            "{} {} for {}",
            style("Checkout").cyan().bold(),
            format_inr(options.amount / 100),
            options.description
        ))?;
        term.write_line(&format!("  order: {}", options.order_id))?;
        term.write_line(&format!("  key:   {}", options.key))?;
        term.write_line(
            "Complete the payment, then paste `payment_id signature` (empty line to cancel):",
        )?;

        let line = tokio::task::spawn_blocking(move || Term::stdout().read_line()).await??;
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(payment_id), Some(signature)) => Ok(CheckoutOutcome::Approved(CheckoutProof {
                order_id: options.order_id.clone(),
                gateway_payment_id: payment_id.to_string(),
                signature: signature.to_string(),
            })),
            (None, _) => Ok(CheckoutOutcome::Dismissed),
            (Some(_), None) => anyhow::bail!("expected a payment id and a signature"),
        }
    }
}

async fn confirm(prompt: String) -> Result<bool> {
    let answer = tokio::task::spawn_blocking(move || {
        let term = Term::stdout();
        term.write_str(&format!("{} [y/N] ", prompt))?;
        term.read_line()
    })
    .await??;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_payment(term: &Term, payment: &PaymentIntent) -> Result<()> {
    let status = match payment.status {
        PaymentStatus::Paid => style(payment.status.label()).green(),
        PaymentStatus::Pending => style(payment.status.label()).yellow(),
        PaymentStatus::Failed | PaymentStatus::Cancelled => style(payment.status.label()).red(),
        PaymentStatus::Refunded => style(payment.status.label()).cyan(),
    };
    term.write_line(&format!(
        "{}  {}  {}  {}  {}  {}",
        payment.transaction_id,
        payment.room_number().unwrap_or("N/A"),
        payment.month_display(),
        format_inr(payment.amount),
        payment.method.label(),
        status
    ))?;
    if let Some(receipt) = &payment.receipt_number {
        term.write_line(&format!("  receipt {}", receipt))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli: Cli = Cli::parse();
    let term = Term::stdout();

    let (mut config, created) = Config::load_or_create(&cli.config)?;
    if created {
        term.write_line(&format!(
            "{}{}",
            style("Writing default configuration...").yellow(),
            style("done").white()
        ))?;
    }
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    if let Some(token) = cli.token {
        config.auth_token = Some(token);
    }
    config.validate()?;

    let log_dir = cli
        .config
        .parent()
        .map(|p| p.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    init_logging(LoggingConfig {
        level: config.logging.level.clone(),
        file_output: config.logging.file_output,
        log_dir,
        ..Default::default()
    })?;

    let context = FlowContext::new(cli.correlation_id);
    let backend = Arc::new(HttpBackend::new(&config)?.with_flow(context.clone()));

    info!(
        api = %config.api_base_url,
        authenticated = config.is_auth_enabled(),
        correlation_id = %context.correlation_id,
        "rentpay starting"
    );

    match cli.command {
        Commands::Pay {
            room,
            amount,
            month,
            method,
            notes,
            accept_terms,
            name,
            email,
            phone,
        } => {
            let room = match room {
                Some(room_id) => backend.room(&room_id).await?,
                None => backend.my_room().await?,
            };
            let buyer = BuyerInfo {
                name,
                email,
                contact: phone,
            };

            let injector = Arc::new(HttpScriptInjector {
                http_client: reqwest::Client::builder()
                    .timeout(config.request_timeout())
                    .build()?,
            });
            let rentpay =
                RentPay::new(config.clone(), backend.clone(), Arc::new(TerminalCheckout), injector)
                    .await;
            let mut flow = rentpay.start_flow(room, buyer, context);

            if let Some(form) = flow.form_mut() {
                if let Some(amount) = amount {
                    form.amount = amount;
                }
                if let Some(month) = month {
                    form.billing_month = month;
                }
                form.method = Some(method);
                form.notes = notes;
                form.terms_accepted = accept_terms;
            }

            if let Err(e) = flow.submit().await {
                for reason in &e.reasons {
                    term.write_line(&format!("{} {}", style("✗").red(), reason))?;
                }
                return Err(e).context("Payment was not created");
            }

            loop {
                match flow.state().clone() {
                    FlowState::AwaitingOnlineCheckout { .. } => {
                        let result = flow.checkout().await.map(|_| ());
                        if let Err(e) = result {
                            e.log();
                            if matches!(flow.state(), FlowState::AwaitingOnlineCheckout { .. })
                                && confirm(format!("{}. Try again?", e.message)).await?
                            {
                                continue;
                            }
                            return Err(e.into());
                        }
                    }
                    FlowState::AwaitingCashConfirmation { .. } => {
                        if let Some(instructions) = flow.cash_instructions() {
                            term.write_line(&format!(
                                "{} {} for {} (reference {})",
                                style("Pay in cash:").cyan().bold(),
                                format_inr(instructions.amount),
                                instructions.month_display,
                                style(&instructions.transaction_id).bold()
                            ))?;
                            for step in instructions.steps {
                                term.write_line(&format!("  • {}", step))?;
                            }
                            term.write_line("Press Ctrl-C to cancel this payment.")?;
                        }

                        let interrupted = tokio::select! {
                            _ = flow.wait_for_confirmation() => false,
                            _ = tokio::signal::ctrl_c() => true,
                        };
                        if !interrupted && !flow.is_polling() {
                            if let FlowState::AwaitingCashConfirmation { .. } = flow.state() {
                                anyhow::bail!("Status polling stopped before the payment settled");
                            }
                        }
                        if interrupted {
                            let result = flow
                                .cancel(|_| true)
                                .await
                                .map(|state| state.clone());
                            if let Err(e) = result {
                                warn!(error = %e, "Cancellation failed");
                                term.write_line(&format!(
                                    "{} {}",
                                    style("Could not cancel:").red(),
                                    e.message
                                ))?;
                            }
                        }
                    }
                    FlowState::Confirmed { intent } => {
                        term.write_line(&format!(
                            "{} Receipt {}",
                            style("Payment confirmed.").green().bold(),
                            intent.receipt_number.as_deref().unwrap_or("pending")
                        ))?;
                        if let Some(by) = &intent.confirmed_by {
                            term.write_line(&format!("  confirmed by {}", by.name()))?;
                        }
                        break;
                    }
                    FlowState::Cancelled { intent } => {
                        term.write_line(&format!(
                            "{} {}",
                            style("Payment cancelled.").yellow(),
                            intent.transaction_id
                        ))?;
                        break;
                    }
                    FlowState::Idle { notice, .. } => {
                        if let Some(notice) = notice {
                            term.write_line(&style(notice).yellow().to_string())?;
                        }
                        break;
                    }
                    FlowState::Submitting | FlowState::Verifying { .. } => break,
                }
            }
        }
        Commands::Status { payment_id } => {
            let payment = backend.payment_status(&payment_id).await?;
            print_payment(&term, &payment)?;
        }
        Commands::Cancel { payment_id, yes } => {
            let payment = backend.payment_status(&payment_id).await?;
            if payment.status != PaymentStatus::Pending {
                anyhow::bail!("Payment is {} and cannot be cancelled", payment.status);
            }
            if !yes
                && !confirm(format!(
                    "Cancel payment {} of {}?",
                    payment.transaction_id,
                    format_inr(payment.amount)
                ))
                .await?
            {
                return Ok(());
            }
            backend.cancel_intent(&payment_id).await?;
            let payment = backend.payment_status(&payment_id).await?;
            print_payment(&term, &payment)?;
        }
        Commands::History {
            search,
            status,
            method,
            export,
        } => {
            let payments = backend.payment_history().await?;
            let stats = HistoryStats::from_payments(&payments);
            let filter = HistoryFilter {
                search,
                status,
                method,
            };
            let rows = filter.apply(&payments);

            match export {
                Some(path) => {
                    let path =
                        path.unwrap_or_else(|| PathBuf::from(export_file_name(Utc::now())));
                    std::fs::write(&path, export_csv(rows.iter().copied()))
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    term.write_line(&format!(
                        "Exported {} payments to {}",
                        rows.len(),
                        path.display()
                    ))?;
                }
                None => {
                    term.write_line(&format!(
                        "Paid {}  Pending {} ({})  Online {}  Cash {}",
                        style(format_inr(stats.total_paid)).green(),
                        style(format_inr(stats.pending_amount)).yellow(),
                        stats.pending_count,
                        stats.online_count,
                        stats.cash_count
                    ))?;
                    for payment in rows {
                        print_payment(&term, payment)?;
                    }
                }
            }
        }
        Commands::Receipt { payment_id } => {
            let receipt = backend.receipt(&payment_id).await?;
            term.write_line(&serde_json::to_string_pretty(&receipt)?)?;
        }
        Commands::Report => {
            let (payments, rooms) = tokio::try_join!(backend.all_payments(), backend.rooms())?;
            let report = Report::build(&payments, &rooms);

            term.write_line(&style("Monthly revenue").bold().to_string())?;
            for month in &report.monthly_revenue {
                term.write_line(&format!(
                    "  {:<16} {}",
                    month.month.display_name(),
                    format_inr(month.revenue)
                ))?;
            }
            term.write_line(&style("Payment methods").bold().to_string())?;
            for method in &report.payment_methods {
                term.write_line(&format!(
                    "  {:<16} {:>4}  {}",
                    method.method.label(),
                    method.count,
                    format_inr(method.amount)
                ))?;
            }
            term.write_line(&format!(
                "{} {} occupied, {} available",
                style("Occupancy").bold(),
                report.occupancy.occupied,
                report.occupancy.available
            ))?;
            term.write_line(&style("Top rooms").bold().to_string())?;
            for room in &report.top_rooms {
                term.write_line(&format!(
                    "  {:<16} {}",
                    room.room_number,
                    format_inr(room.revenue)
                ))?;
            }
        }
        Commands::ConfirmCash { payment_id, notes } => {
            let payment = backend.confirm_cash(&payment_id, notes.as_deref()).await?;
            print_payment(&term, &payment)?;
        }
    }

    Ok(())
}
