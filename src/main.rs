//! Process entry point (spec §6.1, §6.7). Loads `.env` if present, then
//! defers everything else to `taskrelay::run`.

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    match taskrelay::run().await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("taskrelay: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
