use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ridealert::config::{self, Config};
use ridealert::db::Store;
use ridealert::error::{Capability, ProfileError};
use ridealert::phone;
use ridealert::platform::address_book::VdirContactSource;
use ridealert::profile::{KvProfileRepository, ProfileRepository};
use ridealert::{
    AlertService, Contact, ContactSelectionStore, DriverProfile, ProfileField, Prompt,
    RefreshOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "ridealert", about = "Send an emergency SMS with your ride details and location")]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the saved driver details
    #[command(subcommand)]
    Driver(DriverCommand),
    /// Browse the address book and pick emergency contacts
    #[command(subcommand)]
    Contacts(ContactsCommand),
    /// Send the emergency alert to every selected contact
    Send(SendArgs),
}

#[derive(Subcommand, Debug)]
enum DriverCommand {
    /// Save driver name, vehicle number and contact
    Set(DriverArgs),
    /// Show the saved driver details
    Show,
}

#[derive(Args, Debug)]
struct DriverArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    vehicle: String,
    #[arg(long)]
    contact: String,
}

#[derive(Subcommand, Debug)]
enum ContactsCommand {
    /// List address-book contacts, marking the selected ones
    List(QueryArgs),
    /// List the selected emergency contacts
    Selected(QueryArgs),
    /// Select or unselect the contact with this phone number
    Toggle(ToggleArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Case-insensitive name filter
    #[arg(default_value = "")]
    query: String,
}

#[derive(Args, Debug)]
struct ToggleArgs {
    phone: String,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Print the sms: URL instead of opening it
    #[arg(long, default_value_t = false)]
    print: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RIDEALERT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    let store = Store::open(config.db_path.as_deref());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Driver(DriverCommand::Set(args)) => handle_driver_set(args, &store),
        Command::Driver(DriverCommand::Show) => handle_driver_show(&store),
        Command::Contacts(command) => runtime.block_on(handle_contacts(command, &config, &store)),
        Command::Send(args) => runtime.block_on(handle_send(args, &config, &store)),
    }
}

fn handle_driver_set(args: DriverArgs, store: &Store) -> Result<()> {
    let repo = KvProfileRepository::new(store);
    let profile = DriverProfile::new(args.name, args.vehicle, args.contact);
    match repo.save(&profile) {
        Ok(()) => match store.unavailable_reason() {
            Some(reason) => bail!("Failed to save driver details: {}", reason),
            None => {
                println!("Driver details saved!");
                Ok(())
            }
        },
        Err(err @ ProfileError::Missing(_)) => bail!("{}", err),
        Err(err) => Err(err).context("Failed to save driver details"),
    }
}

fn handle_driver_show(store: &Store) -> Result<()> {
    let repo = KvProfileRepository::new(store);
    match repo.get() {
        Ok(Some(profile)) => {
            for field in ProfileField::ALL {
                println!("{}: {}", field.label(), profile.field(field));
            }
        }
        Ok(None) => println!("No driver details saved."),
        Err(err) => {
            tracing::warn!(error = %err, "driver profile unreadable");
            println!("No driver details saved.");
        }
    }
    Ok(())
}

async fn handle_contacts(
    command: ContactsCommand,
    config: &Config,
    kv: &Store,
) -> Result<()> {
    let mut store = ContactSelectionStore::load_from(kv);

    match command {
        ContactsCommand::Selected(args) => {
            let selected = store.filter_selected(&args.query);
            if selected.is_empty() {
                println!("No emergency contacts selected.");
            }
            for contact in selected {
                print_contact(contact, true, config);
            }
        }
        ContactsCommand::List(args) => {
            let source = VdirContactSource::new(&config.address_book);
            report_refresh(store.refresh_full_contacts(&source).await)?;
            for contact in store.filter_full(&args.query) {
                print_contact(contact, store.is_selected(&contact.phone), config);
            }
        }
        ContactsCommand::Toggle(args) => {
            let source = VdirContactSource::new(&config.address_book);
            if let Err(err) = report_refresh(store.refresh_full_contacts(&source).await) {
                tracing::warn!(error = %err, "toggling against the stored selection only");
            }
            let contact = find_contact(&store, &args.phone)
                .with_context(|| format!("no contact with phone {}", args.phone))?;
            let selected = store.toggle(&contact);
            println!(
                "{} {} ({})",
                if selected { "Selected" } else { "Removed" },
                contact.name,
                contact.phone
            );
        }
    }
    Ok(())
}

/// Exact phone first, then the digits-only form, over the address book and
/// then the current selection.
fn find_contact<S: ridealert::kv::KeyValueStore>(
    store: &ContactSelectionStore<S>,
    phone_arg: &str,
) -> Option<Contact> {
    let digits = phone::normalize_digits(phone_arg);
    let lists = [store.full_contacts(), store.selected()];
    lists
        .iter()
        .find_map(|list| list.iter().find(|c| c.phone == phone_arg))
        .or_else(|| {
            if digits.is_empty() {
                return None;
            }
            lists.iter().find_map(|list| {
                list.iter()
                    .find(|c| phone::normalize_digits(&c.phone) == digits)
            })
        })
        .cloned()
}

fn report_refresh(outcome: RefreshOutcome) -> Result<()> {
    match outcome {
        RefreshOutcome::Updated(_) | RefreshOutcome::Stale => Ok(()),
        RefreshOutcome::NeedsPermission(capability) => bail!(permission_hint(capability)),
        RefreshOutcome::Failed(reason) => bail!("could not read the address book: {}", reason),
    }
}

fn permission_hint(capability: Capability) -> String {
    format!(
        "Permission required: enable {} access in settings.",
        capability
    )
}

fn print_contact(contact: &Contact, selected: bool, config: &Config) {
    println!(
        "[{}] {}\t{}",
        if selected { "x" } else { " " },
        contact.name,
        phone::display_value(&contact.phone, config.phone_region.as_deref())
    );
}

async fn handle_send(args: SendArgs, config: &Config, kv: &Store) -> Result<()> {
    let store = ContactSelectionStore::load_from(kv);
    let service = AlertService::new(
        KvProfileRepository::new(kv),
        config.location.provider(),
        config.commands.sms_handler(args.print),
    )
    .with_options(config.location.options);

    match service.send_alert(&store).await {
        Ok(payload) => {
            eprintln!(
                "Alert sent to {} contact(s).",
                payload.recipients.len()
            );
            Ok(())
        }
        Err(err) => {
            let hint = match err.prompt() {
                Prompt::SelectContacts => " Run `ridealert contacts toggle <PHONE>` to add one.",
                Prompt::OpenSettings => " Open your system settings to grant access.",
                Prompt::Retry => " Please try again.",
                Prompt::Terminal => "",
            };
            bail!("{}{}", err.user_message(), hint)
        }
    }
}
