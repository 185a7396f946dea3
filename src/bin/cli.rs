use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use reqwest::multipart;

use chatkiosk::models::{model_supports_files, Attachment, ChatReply, SUPPORTED_MODELS};
use chatkiosk::session::{AdSlotConfig, PlaygroundSession, AD_INTERVAL, ERROR_MARKER};
use chatkiosk::store::FileStore;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8170";
const DEFAULT_STATE_FILE: &str = "chatkiosk-state.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let server_url = std::env::var("CHATKIOSK_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
  let state_file =
    std::env::var("CHATKIOSK_STATE_FILE").unwrap_or_else(|_| DEFAULT_STATE_FILE.to_string());
  let ad_slot = AdSlotConfig::from_env();

  let store = FileStore::open(&state_file)
    .with_context(|| format!("opening state file {state_file}"))?;
  let mut session = PlaygroundSession::new(store);
  let client = reqwest::Client::new();

  println!("chatkiosk at {server_url} (/help for commands)");
  print_message("assistant", &session.messages()[0].content);
  if session.ad_due() {
    render_interstitial(&ad_slot);
  }

  loop {
    if session.ad_due() {
      println!("[ad showing; /dismiss to close it]");
    }
    print!("> ");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
      break;
    }
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
      ("/quit", _) | ("/exit", _) => break,
      ("/help", _) => print_help(),
      ("/clear", _) => {
        session.clear_chat();
        print_message("assistant", &session.messages()[0].content);
      }
      ("/dismiss", _) => session.dismiss_ad(),
      ("/models", _) => {
        for model in SUPPORTED_MODELS {
          let marker = if model.id == session.model() { "*" } else { " " };
          let files = if model.file_support { "files ok" } else { "text only" };
          println!("{marker} {:<14} {} ({files})", model.id, model.label);
        }
      }
      ("/model", id) => {
        if session.select_model(id) {
          println!("model set to {id} (pending attachments cleared)");
        } else {
          println!("unknown model: {id} (try /models)");
        }
      }
      ("/attach", path) => match load_attachment(path) {
        Ok(attachment) => {
          let name = attachment.filename.clone();
          if session.attach(attachment) {
            println!("attached {name} ({} staged)", session.attachments().len());
          } else {
            println!("{} does not take files (try /models)", session.model());
          }
        }
        Err(err) => println!("could not read {path}: {err}"),
      },
      ("/detach", _) => {
        session.detach_all();
        println!("attachments cleared");
      }
      (command, _) if command.starts_with('/') => {
        println!("unknown command: {command} (/help for commands)");
      }
      _ => {
        session.begin_prompt(line);
        if session.ad_due() {
          render_interstitial(&ad_slot);
        }
        match send_chat(&client, &server_url, &session).await {
          Ok(reply) => {
            session.complete_prompt(&reply);
            print_message("assistant", &reply);
          }
          Err(message) => {
            session.fail_prompt(&message);
            print_message("assistant", &format!("{ERROR_MARKER}{message}"));
          }
        }
      }
    }
  }

  Ok(())
}

/// One submission, mirroring what the browser page sends: multipart when
/// files are staged for a file-capable model, plain JSON otherwise. Any
/// failure comes back as the message to show in the thread.
async fn send_chat(
  client: &reqwest::Client,
  base_url: &str,
  session: &PlaygroundSession<FileStore>,
) -> Result<String, String> {
  let url = format!("{base_url}/api/chat");

  let request = if !session.attachments().is_empty() && model_supports_files(session.model()) {
    let messages = serde_json::to_string(session.messages()).map_err(|err| err.to_string())?;
    let mut form = multipart::Form::new()
      .text("messages", messages)
      .text("model", session.model().to_string());
    for attachment in session.attachments() {
      let part = multipart::Part::bytes(attachment.bytes.clone())
        .file_name(attachment.filename.clone())
        .mime_str(&attachment.media_type)
        .map_err(|err| err.to_string())?;
      form = form.part("files", part);
    }
    client.post(&url).multipart(form)
  } else {
    client.post(&url).json(&serde_json::json!({
      "messages": session.messages(),
      "model": session.model(),
    }))
  };

  let response = request.send().await.map_err(|err| err.to_string())?;
  if response.status().is_success() {
    let reply: ChatReply = response.json().await.map_err(|err| err.to_string())?;
    Ok(reply.reply)
  } else {
    let error = response
      .json::<serde_json::Value>()
      .await
      .ok()
      .and_then(|value| value.get("error").and_then(|e| e.as_str()).map(String::from))
      .unwrap_or_else(|| "Request failed".to_string());
    Err(error)
  }
}

fn load_attachment(path: &str) -> anyhow::Result<Attachment> {
  let bytes = std::fs::read(path)?;
  let filename = Path::new(path)
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string());
  Ok(Attachment {
    media_type: media_type_for(&filename).to_string(),
    filename,
    bytes,
  })
}

fn media_type_for(filename: &str) -> &'static str {
  match filename.rsplit_once('.').map(|(_, ext)| ext) {
    Some("pdf") => "application/pdf",
    Some("txt") => "text/plain",
    Some("doc") => "application/msword",
    Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    _ => "application/octet-stream",
  }
}

fn render_interstitial(slot: &AdSlotConfig) {
  println!();
  println!("==================================================");
  println!("Thanks for supporting free AI!");
  println!("{}", slot.render());
  println!("The chat will resume after this short ad.");
  println!("(/dismiss to close)");
  println!("==================================================");
}

fn print_message(role: &str, content: &str) {
  println!("{role}: {content}");
}

fn print_help() {
  println!("/models          list models (* marks the selected one)");
  println!("/model <id>      switch model; staged attachments are dropped");
  println!("/attach <path>   stage a file for the next prompt");
  println!("/detach          drop staged attachments");
  println!("/clear           reset the conversation");
  println!("/dismiss         close the ad shown every {AD_INTERVAL} prompts");
  println!("/quit            exit");
}
