use std::process::ExitCode;

use moodcast_core::AppError;
use moodcast_weather::suggest_mood;
use uuid::Uuid;

mod app;

use app::App;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Moodcast failed: {}", e);
            eprintln!("{}", e.user_message());
            eprintln!("  {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    moodcast_core::init()?;

    let (config, _validation) = moodcast_core::Config::load_validated()?;
    let app = App::new(config)?;

    tracing::info!("Moodcast started");

    println!("Moodcast - Weather & Mood Journal");
    println!("\nConfiguration:");
    println!("  Config directory: {}", app.config().config_dir.display());
    println!("  Records:          {}", app.config().records_path().display());
    println!(
        "  Weather cache:    {}",
        app.config().weather_cache_path().display()
    );
    println!(
        "  Remote store:     {}",
        if app.config().remote.is_configured() {
            app.config().remote.url.as_str()
        } else {
            "not configured (local only)"
        }
    );
    let users = app
        .local_user_count()
        .map_err(|e| AppError::Service(e.to_string()))?;
    println!("  Local users:      {}", users);

    let location = app.config().weather.default_location.clone();
    match app.weather().fetch_current(&location, false).await {
        Ok(fetched) => {
            let obs = &fetched.observation;
            println!(
                "\nWeather in {}: {:.1}°C, {} ({:?})",
                obs.location_name,
                obs.temperature,
                obs.condition().description(),
                fetched.source
            );
            if let Some(warning) = &fetched.warning {
                println!("  {}", warning);
            }

            let suggestion = suggest_mood(obs);
            println!(
                "  Suggested mood:   {:?} (happiness {}, energy {})",
                suggestion.mood, suggestion.happiness, suggestion.energy
            );
            if let Some(idea) = suggestion.recommendations.first() {
                println!("  {}", idea);
            }
        }
        Err(e) => {
            tracing::warn!("Weather unavailable for {}: {}", location, e);
            println!("\nWeather unavailable: {}", e.user_message());
        }
    }

    match app.forecast(&location).await {
        Ok(bundle) => {
            for day in &bundle.days {
                println!(
                    "  {}: {:.0}-{:.0}°C, {}",
                    day.date, day.min_temperature, day.max_temperature, day.condition_text
                );
            }
        }
        Err(e) => tracing::debug!("Forecast unavailable for {}: {}", location, e),
    }

    // Optional first argument: a user id whose journal to summarize.
    if let Some(arg) = std::env::args().nth(1) {
        let user_id = Uuid::parse_str(&arg)
            .map_err(|e| AppError::Service(format!("Invalid user id {}: {}", arg, e)))?;
        print_journal(&app, user_id).await?;
    }

    Ok(())
}

async fn print_journal(app: &App, user_id: Uuid) -> Result<(), AppError> {
    let service = |e: moodcast_store::StoreError| AppError::Service(e.to_string());

    let Some(user) = app.records().find_by_id(user_id).await.map_err(service)? else {
        println!("\nNo user {}", user_id);
        return Ok(());
    };

    let entries = app.recent_entries(user_id).await.map_err(service)?;
    let insights = app.insights(user_id).await.map_err(service)?;

    println!("\nJournal of {} <{}>:", user.name, user.email);
    for entry in &entries {
        println!(
            "  {} {} ({}/10)",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.emotion_type,
            entry.intensity
        );
    }
    println!(
        "  {} entries in the last {} days, average mood {:.1}",
        insights.total_entries,
        app.config().journal.window_days,
        insights.average_mood
    );

    Ok(())
}
