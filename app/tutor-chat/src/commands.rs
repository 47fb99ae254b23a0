//! Command execution for the terminal front end

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use tutor_core::{
    gate_for_policy, AnswerService, GeneratedAnswer, GenerationMode, LessonCatalog,
    LlamaCppBackend, ModelSelector, ProfileStore, TutorConfig,
};

use crate::cli::Cli;

/// Experience for each question asked or lesson opened
const XP_PER_INTERACTION: u64 = 1;

/// File config first, then command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<TutorConfig> {
    let mut config = match &cli.config {
        Some(path) => TutorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TutorConfig::default(),
    };

    if let Some(model) = &cli.model {
        config.model = ModelSelector::from(model.clone());
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if cli.strict {
        config.service.strict_gating = true;
    }

    config.validate()?;
    Ok(config)
}

pub async fn start_service(config: &TutorConfig) -> Result<AnswerService> {
    let selector = config.model.clone();
    let generation = config.generation.clone();
    let model_dir = config.model_dir.clone();

    tracing::info!(model = %selector, model_dir = %model_dir.display(), "Starting tutor");
    let backend = tokio::task::spawn_blocking(move || {
        LlamaCppBackend::new(selector, generation, model_dir)
    })
    .await
    .context("Model loading task panicked")?
    .with_context(|| format!("Failed to load model '{}'", config.model))?;

    let profile = backend.device_profile();
    tracing::info!(
        weights = %backend.weights_path().display(),
        device = ?profile.device,
        precision = ?profile.precision,
        gpu_layers = profile.gpu_layers,
        "Model ready"
    );

    let gate = gate_for_policy(config.service.strict_gating);
    Ok(AnswerService::new(gate, Box::new(backend), &config.service)?)
}

/// One line typed into the chat
#[derive(Debug, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Skip,
    Quit,
    SwitchModel(&'a str),
    Status,
    Question(&'a str),
}

pub fn parse_chat_line(line: &str) -> ChatInput<'_> {
    let line = line.trim();
    match line {
        "" => ChatInput::Skip,
        "/salir" | "/exit" | "/quit" => ChatInput::Quit,
        "/estado" | "/status" => ChatInput::Status,
        _ => match line.strip_prefix("/modelo ").or_else(|| line.strip_prefix("/model ")) {
            Some(name) if !name.trim().is_empty() => ChatInput::SwitchModel(name.trim()),
            _ => ChatInput::Question(line),
        },
    }
}

/// Text shown for a finished request
pub fn render_outcome(outcome: tutor_core::Result<GeneratedAnswer>) -> String {
    match outcome {
        Ok(answer) if answer.text.trim().is_empty() => "(sin respuesta)".to_string(),
        Ok(answer) => answer.text,
        Err(err) => format!("[Error] {err}"),
    }
}

fn prompt_marker() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

pub async fn chat(
    service: &AnswerService,
    profile: &mut ProfileStore,
    system_prompt: Option<&str>,
) -> Result<()> {
    println!(
        "Tutor de matemáticas ({}). Escribe tu pregunta, /modelo <nombre>, /estado o /salir.",
        service.active_model()
    );
    prompt_marker()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_chat_line(&line) {
            ChatInput::Skip => {}
            ChatInput::Quit => break,
            ChatInput::Status => {
                let in_flight = service.in_flight();
                println!("{}", serde_json::to_string_pretty(&in_flight)?);
            }
            ChatInput::SwitchModel(name) => {
                match service.set_model(ModelSelector::from(name.to_string())).await {
                    Ok(()) => println!("Modelo activo: {}", service.active_model()),
                    Err(err) => println!("[Error] {err}"),
                }
            }
            ChatInput::Question(question) => {
                let handle = service.ask(question, system_prompt, GenerationMode::Default);
                profile.add_xp(XP_PER_INTERACTION)?;
                println!("{}", render_outcome(handle.answer().await));
            }
        }
        prompt_marker()?;
    }
    Ok(())
}

fn load_catalog(config: &TutorConfig) -> Result<LessonCatalog> {
    let path = config.lessons_path();
    LessonCatalog::from_file(&path)
        .with_context(|| format!("Failed to read lessons from {}", path.display()))
}

pub fn list_lessons(config: &TutorConfig, profile: &ProfileStore, only: Option<&str>) -> Result<()> {
    let catalog = load_catalog(config)?;
    if catalog.is_empty() {
        println!("No hay lecciones disponibles.");
        return Ok(());
    }

    let completed = profile.completed_pairs();
    for unit in catalog.unit_names() {
        if only.is_some_and(|wanted| wanted != unit) {
            continue;
        }
        println!("{unit}");
        for lesson in catalog.lessons(unit).unwrap_or_default() {
            let mark = if completed.contains(&(unit.to_string(), lesson.title.clone())) {
                "x"
            } else {
                " "
            };
            println!("  [{mark}] {}: {}", lesson.title, lesson.description);
        }
    }
    Ok(())
}

pub async fn explain(
    config: &TutorConfig,
    profile: &mut ProfileStore,
    unit: &str,
    title: &str,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    let Some(lesson) = catalog.find(unit, title) else {
        bail!("Lesson '{title}' not found in unit '{unit}'");
    };
    profile.add_xp(XP_PER_INTERACTION)?;

    println!("{}\n{}\n", lesson.title, lesson.description);
    let mut cursor = lesson.cursor();
    loop {
        println!("[{}/{}]\n{}\n", cursor.index() + 1, cursor.len().max(1), cursor.current_html());
        if !cursor.forward() {
            break;
        }
    }

    let service = start_service(config).await?;
    let handle = service.ask(&lesson.explain_question(), None, GenerationMode::Explain);
    println!("{}", render_outcome(handle.answer().await));
    Ok(())
}

pub fn complete(
    config: &TutorConfig,
    profile: &mut ProfileStore,
    unit: &str,
    title: &str,
    xp_gain: u64,
) -> Result<()> {
    let catalog = load_catalog(config)?;
    if catalog.find(unit, title).is_none() {
        bail!("Lesson '{title}' not found in unit '{unit}'");
    }

    if profile.record_completion(unit, title, xp_gain)? {
        println!("Lección completada: {title} (+{xp_gain} XP)");
    } else {
        println!("La lección {title} ya estaba completada.");
    }
    Ok(())
}

pub fn show_profile(profile: &mut ProfileStore, recent: usize, reset: bool) -> Result<()> {
    if reset {
        profile.reset()?;
        println!("Progreso reiniciado.");
    }

    println!("Puntos de experiencia: {}", profile.xp());
    println!("Lecciones completadas: {}", profile.lessons_completed());
    for completion in profile.recent(recent) {
        println!(
            "  {}  {} / {}",
            completion.ts.format("%Y-%m-%d %H:%M"),
            completion.unit,
            completion.title
        );
    }
    Ok(())
}
