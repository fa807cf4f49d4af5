use std::{error::Error, path::Path, process::exit};

use clap::Parser;
use rusqlite::Connection;

use finquest::user::{Role, set_role};

/// A utility for granting or revoking the admin role of a registered user.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The email address of the user to promote.
    #[arg(long)]
    email: String,

    /// Demote the user back to a regular user instead.
    #[arg(long, default_value_t = false)]
    revoke: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let db_path = Path::new(&args.db_path);

    if !db_path.is_file() {
        eprintln!("File does not exist at {db_path:#?}!");
        exit(1);
    }

    let role = if args.revoke { Role::User } else { Role::Admin };
    let connection = Connection::open(db_path)?;

    match set_role(&args.email, role, &connection) {
        Ok(()) => {
            println!("{} is now {role:?}.", args.email);
            Ok(())
        }
        Err(finquest::Error::NotFound) => {
            eprintln!("No user with the email {} exists.", args.email);
            exit(1);
        }
        Err(error) => Err(error.into()),
    }
}
