//! Terminal front end: a line-oriented chat shell over the session, with
//! slash commands for navigation, documents, and the admin panel. Ctrl-C
//! during a streaming reply stops generation instead of exiting.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use amaraste::db::Database;
use amaraste::persona;
use amaraste::presenter::transcript::Sender;
use amaraste::session::nav::Screen;
use amaraste::session::{DocumentSlot, Session};

enum Flow {
    Continue,
    Quit,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,amaraste=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("amaraste")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let db = Arc::new(Database::new(&data_dir())?);
    let mut session = Session::new(db);

    println!("Amarasté — digite /help para comandos.\n");
    if let Some(greeting) = session.transcript().last() {
        println!("{}\n", greeting.text);
    }
    if let Some(err) = session.config_error() {
        println!("{err}\n");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(command) = line.strip_prefix('/') {
                    if matches!(handle_command(&mut session, command).await, Flow::Quit) {
                        break;
                    }
                    continue;
                }
                if let Some(err) = session.config_error() {
                    println!("{err}");
                    continue;
                }
                run_chat_turn(&mut session, line).await;
            }
            _ = tokio::time::sleep_until(session.idle_deadline()), if session.can_re_engage() => {
                run_re_engage(&mut session).await;
            }
        }
    }

    println!("Até logo. 🌹");
    Ok(())
}

async fn run_chat_turn(session: &mut Session, input: &str) {
    // Ctrl-C stops the reply at the next word boundary.
    let stop = session.stop_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    println!();
    let outcome = session
        .send_message(input, |token| {
            print!("{token}");
            let _ = std::io::stdout().flush();
        })
        .await;
    ctrl_c.abort();
    println!();

    match outcome {
        Ok(_) => render_attachments(session),
        Err(e) => println!("{e}"),
    }
    if let Some(err) = session.last_error() {
        println!("{err}");
    }
    println!();
}

async fn run_re_engage(session: &mut Session) {
    println!();
    let outcome = session
        .re_engage(|token| {
            print!("{token}");
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();
    if outcome.is_some() {
        render_attachments(session);
    }
    println!();
}

fn render_attachments(session: &Session) {
    let Some(last) = session.transcript().last() else {
        return;
    };
    if last.sender != Sender::Assistant {
        return;
    }
    if let Some(id) = &last.youtube_id {
        println!("▶ https://www.youtube.com/watch?v={id}");
    }
    if last.show_sign_up {
        println!("[{}]", persona::SIGN_UP_CTA);
    }
}

async fn handle_command(session: &mut Session, command: &str) -> Flow {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("help", _) => {
            println!("Comandos:");
            println!("  /screens                 telas disponíveis");
            println!("  /go <tela>               navegar (pdf/booker carregam o documento)");
            println!("  /open <pdf|booker>       carregar um documento do cache ou da origem");
            println!("  /login <user> <senha>    entrar no painel admin");
            println!("  /back                    sair do painel admin");
            println!("  /assets                  [admin] documentos em cache");
            println!("  /upload <slot> <arquivo> [admin] substituir o documento de um slot");
            println!("  /rm <slot>               [admin] remover o documento de um slot");
            println!("  /set <chave> <valor>     [admin] gravar uma configuração");
            println!("  /settings                configurações gravadas");
            println!("  /history                 transcrição em JSON");
            println!("  /reset                   recomeçar a conversa");
            println!("  /quit                    sair");
        }
        ("quit" | "exit", _) => return Flow::Quit,
        ("reset", _) => {
            session.reset();
            if let Some(greeting) = session.transcript().last() {
                println!("{}", greeting.text);
            }
        }
        ("login", [user, pass]) => {
            if session.nav.admin_login(user, pass) {
                println!("Painel admin aberto.");
            } else {
                println!("Credenciais inválidas.");
            }
        }
        ("login", _) => println!("uso: /login <user> <senha>"),
        ("back", _) => {
            session.nav.leave_admin();
            println!("Tela ativa: {}", session.nav.active().name());
        }
        ("screens", _) => {
            for screen in Screen::all() {
                let marker = if *screen == session.nav.active() { "*" } else { " " };
                println!("{marker} {}", screen.name());
            }
        }
        ("go", [name]) => match Screen::parse(name) {
            Some(screen) => {
                if let Some(slot) = screen.required_document() {
                    match session.open_document(slot).await {
                        Ok(blob) => {
                            println!("Documento '{}' pronto ({} bytes).", blob.filename, blob.bytes.len())
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "document preload failed");
                            println!("Não foi possível carregar o conteúdo. Por favor, tente novamente.");
                            return Flow::Continue;
                        }
                    }
                }
                match session.nav.navigate(screen) {
                    Ok(()) => println!("Tela ativa: {}", session.nav.active().name()),
                    Err(e) => println!("{e}"),
                }
            }
            None => println!("Tela desconhecida: {name}"),
        },
        ("go", _) => println!("uso: /go <tela>"),
        ("open", [slot]) => match DocumentSlot::parse(slot) {
            Some(slot) => match session.open_document(slot).await {
                Ok(blob) => {
                    println!("Documento '{}' pronto ({} bytes).", blob.filename, blob.bytes.len())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "document load failed");
                    println!("Não foi possível carregar o conteúdo. Por favor, tente novamente.");
                }
            },
            None => println!("Slot desconhecido: {slot}"),
        },
        ("open", _) => println!("uso: /open <pdf|booker>"),
        ("assets", _) => match session.list_assets() {
            Ok(records) if records.is_empty() => println!("Nenhum documento em cache."),
            Ok(records) => {
                for r in records {
                    println!("{}  {}  {} bytes  {}", r.key, r.filename, r.size, r.created_at);
                }
            }
            Err(e) => println!("{e}"),
        },
        ("upload", [slot, path]) => match DocumentSlot::parse(slot) {
            Some(slot) => match session.upload_asset(slot, Path::new(path)) {
                Ok(()) => println!("Documento salvo."),
                Err(e) => println!("{e}"),
            },
            None => println!("Slot desconhecido: {slot}"),
        },
        ("upload", _) => println!("uso: /upload <slot> <arquivo>"),
        ("rm", [slot]) => match DocumentSlot::parse(slot) {
            Some(slot) => match session.remove_asset(slot) {
                Ok(()) => println!("Documento removido."),
                Err(e) => println!("{e}"),
            },
            None => println!("Slot desconhecido: {slot}"),
        },
        ("rm", _) => println!("uso: /rm <slot>"),
        ("set", [key, value]) => match session.set_setting(key, value) {
            Ok(()) => println!("Configuração gravada."),
            Err(e) => println!("{e}"),
        },
        ("set", _) => println!("uso: /set <chave> <valor>"),
        ("settings", _) => match session.settings() {
            Ok(pairs) if pairs.is_empty() => println!("Nenhuma configuração gravada."),
            Ok(pairs) => {
                for (key, value) in pairs {
                    println!("{key} = {value}");
                }
            }
            Err(e) => println!("{e}"),
        },
        ("history", _) => match serde_json::to_string_pretty(session.transcript().entries()) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("{e}"),
        },
        _ => println!("Comando desconhecido: /{name} (veja /help)"),
    }
    Flow::Continue
}
