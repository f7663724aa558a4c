use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use sinistres_client::api::ApiClient;
use sinistres_client::config::{ConfigArgs, Settings};
use sinistres_client::screen::{AlwaysConfirm, Confirm, ResourceScreen};
use sinistres_client::session::{
    CallServices, ClipMicrophone, FetchPlayback, SilentSpeech, WsConnector, start_call,
};
use sinistres_client::telemetry::init_tracing;
use sinistres_core::analysis::{Emotion, SentenceKind, cognitive_profile};
use sinistres_core::analytics::emotion_percentages;
use sinistres_core::call::{CallMode, Notice, Phase};
use sinistres_core::conversation::Speaker;
use sinistres_core::models::{Client, Contrat, Escalade, Remboursement, Resource, Sinistre};
use sinistres_core::{analyze, emotional_score};

/// Advisor console and claim-filing client for the sinistres backend.
#[derive(Parser, Debug)]
#[command(name = "sinistres", version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Clients,
    Contrats,
    Sinistres,
    Escalades,
    Remboursements,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a collection, optionally filtered by a search term
    List {
        kind: Kind,
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Show one record as JSON
    Show { kind: Kind, id: String },
    /// Create a record from a JSON form payload
    Create {
        kind: Kind,
        #[arg(long)]
        json: String,
    },
    /// Replace a record from a JSON form payload
    Update {
        kind: Kind,
        id: String,
        #[arg(long)]
        json: String,
    },
    /// Delete a record after confirmation
    Delete {
        kind: Kind,
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
    /// Look a client up by matricule
    Matricule { matricule: String },
    /// List advisors and their load
    Conseillers,
    /// Pending escalations
    Queue,
    /// Dashboard aggregates
    Overview,
    /// Emotion statistics, alerts and distribution
    Emotions,
    /// Cognitive analysis of a text or of a claim description
    Analyze {
        #[arg(long, conflicts_with = "sinistre")]
        text: Option<String>,
        #[arg(long)]
        sinistre: Option<String>,
    },
    /// Conversation in message mode: type turns, `/record`, `/stop`, `/audio <file>`, `/quit`
    Chat {
        /// Clips answered by the microphone, in order
        #[arg(long = "clip")]
        clips: Vec<PathBuf>,
    },
    /// Hands-free call: each turn records the next clip
    Call {
        #[arg(long = "clip", required = true)]
        clips: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = cli.config.into_settings()?;
    info!(api_url = %settings.api_url, ws_url = %settings.ws_url, "sinistres client starting");

    let api = ApiClient::new(settings.clone())?;
    if let Err(err) = run(cli.command, &api, &settings).await {
        error!(error = %err, "command failed");
        eprintln!("Erreur: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command, api: &ApiClient, settings: &Settings) -> Result<()> {
    match command {
        Command::List { kind, search } => match kind {
            Kind::Clients => list::<Client>(api, &search).await,
            Kind::Contrats => list::<Contrat>(api, &search).await,
            Kind::Sinistres => list::<Sinistre>(api, &search).await,
            Kind::Escalades => list::<Escalade>(api, &search).await,
            Kind::Remboursements => list::<Remboursement>(api, &search).await,
        },
        Command::Show { kind, id } => match kind {
            Kind::Clients => show::<Client>(api, &id).await,
            Kind::Contrats => show::<Contrat>(api, &id).await,
            Kind::Sinistres => show::<Sinistre>(api, &id).await,
            Kind::Escalades => show::<Escalade>(api, &id).await,
            Kind::Remboursements => show::<Remboursement>(api, &id).await,
        },
        Command::Create { kind, json } => match kind {
            Kind::Clients => create::<Client>(api, &json).await,
            Kind::Contrats => create::<Contrat>(api, &json).await,
            Kind::Sinistres => create::<Sinistre>(api, &json).await,
            Kind::Escalades => create::<Escalade>(api, &json).await,
            Kind::Remboursements => create::<Remboursement>(api, &json).await,
        },
        Command::Update { kind, id, json } => match kind {
            Kind::Clients => update::<Client>(api, &id, &json).await,
            Kind::Contrats => update::<Contrat>(api, &id, &json).await,
            Kind::Sinistres => update::<Sinistre>(api, &id, &json).await,
            Kind::Escalades => update::<Escalade>(api, &id, &json).await,
            Kind::Remboursements => update::<Remboursement>(api, &id, &json).await,
        },
        Command::Delete { kind, id, yes } => match kind {
            Kind::Clients => delete::<Client>(api, &id, yes).await,
            Kind::Contrats => delete::<Contrat>(api, &id, yes).await,
            Kind::Sinistres => delete::<Sinistre>(api, &id, yes).await,
            Kind::Escalades => delete::<Escalade>(api, &id, yes).await,
            Kind::Remboursements => delete::<Remboursement>(api, &id, yes).await,
        },
        Command::Matricule { matricule } => match api.client_by_matricule(&matricule).await? {
            Some(client) => print_json(&client),
            None => bail!("aucun client avec le matricule {matricule}"),
        },
        Command::Conseillers => {
            for c in api.conseillers().await? {
                println!(
                    "{}  {} {}  {}  {}/{}",
                    c.id,
                    c.prenom,
                    c.nom,
                    c.statut.as_deref().unwrap_or("-"),
                    c.nombre_dossiers_actifs,
                    c.capacite_max
                );
            }
            Ok(())
        }
        Command::Queue => {
            let queue = api.escalade_queue().await?;
            println!("{} escalade(s) en attente", queue.count);
            for item in queue.items {
                let numero = item
                    .sinistre
                    .as_ref()
                    .and_then(|s| s.numero.as_deref())
                    .unwrap_or("-");
                println!(
                    "{}  {}  {}  CCI {}  {}",
                    item.escalade_id,
                    numero,
                    item.status,
                    item.cci_score.map_or("-".to_string(), |s| s.to_string()),
                    item.raison.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Command::Overview => {
            let overview = api.overview().await?;
            let k = &overview.kpis;
            println!(
                "clients {}  sinistres {}  escalades {}  remboursements {}",
                k.clients_total, k.sinistres_total, k.escalades_total, k.remboursements_total
            );
            println!("CCI moyen {:.1} (min {}, max {})", k.cci_avg, k.cci_min, k.cci_max);
            for bucket in &overview.cci_buckets {
                println!("  CCI {:>7}: {}", bucket.range, bucket.value);
            }
            for status in &overview.sinistres_by_status {
                println!("  {:<18} {}", status.name, status.value);
            }
            let sums = &overview.remboursements_sum;
            println!(
                "remboursements: réclamé {:.2}  accepté {:.2}  net {:.2}",
                sums.reclame, sums.accepte, sums.net
            );
            for card in &overview.cognitive_cards {
                println!(
                    "  {}  {}  faits {}  propositions {}  confiance {}%",
                    card.numero_sinistre, card.client, card.facts, card.propositions, card.confidence
                );
            }
            Ok(())
        }
        Command::Emotions => {
            let stats = api.emotion_stats().await?;
            let alerts = api.emotion_alerts().await?;
            let dashboard = api.emotion_dashboard().await?;
            println!(
                "{} enregistrements ({} clients, {} conseillers), {:.1} Mo",
                stats.total_recordings, stats.client_audios, stats.advisor_audios, stats.storage_mb
            );
            for (label, pct) in emotion_percentages(&dashboard.emotion_counts) {
                println!("  {label:<12} {pct:>5.1}%");
            }
            println!("{} alerte(s)", alerts.alert_count);
            for alert in alerts.alerts {
                println!(
                    "  [{}] {} {:.0}%  {}",
                    alert.severity,
                    alert.emotion,
                    alert.confidence * 100.0,
                    alert.transcription.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Command::Analyze { text, sinistre } => {
            let (text, cci) = match (text, sinistre) {
                (Some(text), _) => (text, None),
                (None, Some(id)) => {
                    let sinistre: Sinistre = api.get(&id).await?;
                    let description = sinistre.description.unwrap_or_default();
                    (description, sinistre.cci_score)
                }
                (None, None) => bail!("--text ou --sinistre est requis"),
            };
            print_analysis(&text, cci);
            Ok(())
        }
        Command::Chat { clips } => converse(settings, api, CallMode::Message, clips).await,
        Command::Call { clips } => converse(settings, api, CallMode::FullCall, clips).await,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary_line<R: Resource>(item: &R) -> String {
    let fields: Vec<&str> = item
        .search_fields()
        .into_iter()
        .map(|f| f.unwrap_or("-"))
        .collect();
    format!("{}  {}", item.id(), fields.join(" | "))
}

async fn list<R: Resource>(api: &ApiClient, search: &str) -> Result<()> {
    let mut screen: ResourceScreen<R, ApiClient> = ResourceScreen::new(api);
    screen.refresh().await?;
    let shown = screen.filtered(search);
    for item in &shown {
        println!("{}", summary_line(*item));
    }
    println!("{} / {} {}", shown.len(), screen.items().len(), R::COLLECTION);
    Ok(())
}

async fn show<R: Resource>(api: &ApiClient, id: &str) -> Result<()> {
    let item: R = api.get(id).await?;
    print_json(&item)
}

fn parse_draft<R: Resource>(json: &str) -> Result<R::Draft>
where
    R::Draft: DeserializeOwned,
{
    serde_json::from_str(json).with_context(|| format!("formulaire {} invalide", R::COLLECTION))
}

async fn create<R: Resource>(api: &ApiClient, json: &str) -> Result<()>
where
    R::Draft: DeserializeOwned,
{
    let draft = parse_draft::<R>(json)?;
    let mut screen: ResourceScreen<R, ApiClient> = ResourceScreen::new(api);
    let created = screen.create(&draft).await?;
    println!("{}", summary_line(&created));
    println!("{} {}", screen.items().len(), R::COLLECTION);
    Ok(())
}

async fn update<R: Resource>(api: &ApiClient, id: &str, json: &str) -> Result<()>
where
    R::Draft: DeserializeOwned,
{
    let draft = parse_draft::<R>(json)?;
    let mut screen: ResourceScreen<R, ApiClient> = ResourceScreen::new(api);
    let updated = screen.update(id, &draft).await?;
    println!("{}", summary_line(&updated));
    Ok(())
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        print!("{question} [o/N] ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "o" | "oui" | "y" | "yes")
    }
}

async fn delete<R: Resource>(api: &ApiClient, id: &str, yes: bool) -> Result<()> {
    let mut screen: ResourceScreen<R, ApiClient> = ResourceScreen::new(api);
    screen.refresh().await?;
    let item = screen
        .find(id)
        .cloned()
        .with_context(|| format!("{} {id} introuvable", R::COLLECTION))?;

    let deleted = if yes {
        screen.delete(&item, &mut AlwaysConfirm).await?
    } else {
        screen.delete(&item, &mut StdinConfirm).await?
    };
    if deleted {
        println!("supprimé; {} {} restant(s)", screen.items().len(), R::COLLECTION);
    } else {
        println!("annulé");
    }
    Ok(())
}

fn print_analysis(text: &str, cci: Option<i64>) {
    let analysis = analyze(text);
    for sentence in &analysis.sentences {
        let kind = match sentence.kind {
            SentenceKind::Fact => "fait",
            SentenceKind::Supposition => "supposition",
            SentenceKind::Neutral => "neutre",
        };
        let emotions: Vec<&str> = sentence.emotions.iter().map(Emotion::label).collect();
        println!(
            "{:>2}. [{kind} {}%] {}{}",
            sentence.id,
            sentence.confiance,
            sentence.texte,
            if emotions.is_empty() {
                String::new()
            } else {
                format!("  ({})", emotions.join(", "))
            }
        );
    }

    let score = emotional_score(&analysis);
    println!(
        "Faits {}  Suppositions {}  Phrases émotionnelles {}",
        analysis.facts().count(),
        analysis.suppositions().count(),
        analysis.emotional().count()
    );
    for emotion in Emotion::ALL {
        println!("  {:<10} {:>3}", emotion.label(), score.get(emotion));
    }
    println!("Score émotionnel global {:.0}", score.global);
    for axis in cognitive_profile(&analysis, cci) {
        println!("  {:<12} {:>4.1}/{}", axis.name, axis.value, axis.max);
    }
}

async fn converse(
    settings: &Settings,
    api: &ApiClient,
    mode: CallMode,
    clips: Vec<PathBuf>,
) -> Result<()> {
    let services = CallServices {
        connector: Arc::new(WsConnector),
        transcriber: Arc::new(api.clone()),
        microphone: Arc::new(ClipMicrophone::new(clips)),
        playback: Arc::new(FetchPlayback::default()),
        speech: Arc::new(SilentSpeech),
    };
    let mut call = start_call(settings, mode, services);
    let handle = call.handle.clone();

    let input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            let sent = match line {
                "/quit" => handle.end_call(),
                "/record" => handle.start_recording(),
                "/stop" => handle.stop_recording(),
                _ => match line.strip_prefix("/audio ") {
                    Some(path) => match tokio::fs::read(path.trim()).await {
                        Ok(audio) => handle.submit_audio(audio),
                        Err(err) => {
                            eprintln!("Erreur: {path}: {err}");
                            continue;
                        }
                    },
                    None => handle.send_text(line),
                },
            };
            if sent.is_err() {
                break;
            }
        }
    });

    while let Some(notice) = call.notices.recv().await {
        match notice {
            Notice::PhaseChanged(phase) => {
                let name = match phase {
                    Phase::Welcome => "accueil",
                    Phase::Dialogue => "dialogue",
                    Phase::Summary => "résumé",
                };
                println!("--- {name} ---");
            }
            Notice::ClaimAssigned(id) => println!("Dossier {id}"),
            Notice::Message(message) => {
                let who = match message.speaker {
                    Speaker::System => "Assistant",
                    Speaker::Client => "Vous",
                };
                let mic = if message.has_audio { " 🎤" } else { "" };
                println!("{who}{mic}: {}", message.text);
            }
            Notice::Alert(text) => eprintln!("Alerte: {text}"),
            Notice::Completed => println!("Déclaration terminée."),
            Notice::Ended => break,
        }
    }

    input.abort();
    let transcript = call.finished().await?;
    info!(messages = transcript.len(), "conversation closed");
    Ok(())
}
