//! CMIS client CLI - browse a repository from the command line

use anyhow::{Context, Result};
use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use cmis::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cmis-client")]
#[command(author, version, about = "Browse CMIS repositories over any binding")]
struct Cli {
    /// Binding URL: AtomPub service document, WSDL, or SharePoint web
    #[arg(long, global = true)]
    url: Option<String>,

    /// Repository id (default: the first one advertised)
    #[arg(short, long, global = true)]
    repository: Option<String>,

    #[arg(short, long, global = true)]
    username: Option<String>,

    #[arg(short, long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the repositories behind the URL
    ListRepos,

    /// Show the root folder and its children
    ShowRoot,

    /// Show an object's properties
    ShowById {
        /// Object id
        id: String,
    },

    /// Download a document's content
    GetContent {
        /// Document id
        id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let Some(url) = cli.url else {
        Cli::command()
            .error(
                ClapErrorKind::MissingRequiredArgument,
                "--url is required for this command",
            )
            .exit();
    };

    let mut params = SessionParameters::new(url);
    params.username = cli.username;
    params.password = cli.password;
    params.repository_id = cli.repository;

    match command {
        Commands::ListRepos => list_repos(&params),
        Commands::ShowRoot => show_root(&params),
        Commands::ShowById { id } => show_by_id(&params, &id),
        Commands::GetContent { id, output } => get_content(&params, &id, output.as_deref()),
    }
}

fn connect(params: &SessionParameters) -> Result<Box<dyn Session>> {
    let factory = SessionFactory::new().context("Failed to set up the HTTP client")?;
    factory
        .create_session(params)
        .with_context(|| format!("Failed to connect to '{}'", params.url))?
        .with_context(|| format!("No CMIS binding answers at '{}'", params.url))
}

fn list_repos(params: &SessionParameters) -> Result<()> {
    let factory = SessionFactory::new().context("Failed to set up the HTTP client")?;
    let repositories = factory
        .get_repositories(params)
        .with_context(|| format!("Failed to list repositories at '{}'", params.url))?
        .with_context(|| format!("No CMIS binding answers at '{}'", params.url))?;

    for repo in &repositories {
        println!("{}\t{}", repo.id(), repo.name());
        if !repo.vendor_name().is_empty() {
            println!(
                "  {} {} {}",
                repo.vendor_name(),
                repo.product_name(),
                repo.product_version()
            );
        }
    }
    eprintln!("{} repositories", repositories.len());
    Ok(())
}

fn show_root(params: &SessionParameters) -> Result<()> {
    let session = connect(params)?;
    let repo = session.repository();
    println!("Repository: {} ({})", repo.name(), repo.id());
    println!("Binding:    {}", session.binding());

    let root = session.root_folder().context("Failed to read the root folder")?;
    print_object(&root);

    let children = root
        .children(session.as_ref())
        .context("Failed to list the root folder")?;
    println!();
    println!("{} children:", children.len());
    for child in &children {
        let kind = if child.is_folder() { "folder" } else { "document" };
        println!("  {:<8} {}  [{}]", kind, child.name(), child.id());
    }
    Ok(())
}

fn show_by_id(params: &SessionParameters, id: &str) -> Result<()> {
    let session = connect(params)?;
    let object = session
        .get_object(id)
        .with_context(|| format!("Failed to read object '{id}'"))?;
    print_object(&object);

    if let Some(actions) = object.allowable_actions() {
        let allowed: Vec<&str> = actions
            .iter()
            .filter(|(_, allowed)| *allowed)
            .map(|(action, _)| action.as_str())
            .collect();
        println!("Allowed: {}", allowed.join(", "));
    }
    Ok(())
}

fn get_content(params: &SessionParameters, id: &str, output: Option<&Path>) -> Result<()> {
    let session = connect(params)?;
    let content = session
        .get_content_stream(id)
        .with_context(|| format!("Failed to download content of '{id}'"))?;

    if let Some(path) = output {
        std::fs::write(path, &content.data)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;
        eprintln!(
            "Wrote {} bytes ({}) to '{}'",
            content.len(),
            content.mime_type(),
            path.display()
        );
    } else {
        io::stdout().write_all(&content.data)?;
    }
    Ok(())
}

fn print_object(object: &Object) {
    println!("{} [{}]", object.name(), object.id());
    for (id, property) in object.properties() {
        println!("  {id} = {}", property.str_values().join(", "));
    }
}
