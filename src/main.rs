mod admin;
mod api;
mod auth;
mod enrollment;
mod flags;
mod grading;
mod logger;
mod models;
mod session;
#[cfg(test)]
mod testutil;

use std::env;
use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::admin::Admin;
use crate::api::{ApiClient, ApiResult, Gateway};
use crate::auth::{Dispatch, LoginOutcome};
use crate::enrollment::{Enrollment, FilterMode, ToggleOutcome};
use crate::grading::{ExpandOutcome, Grading, SaveOutcome};
use crate::models::{Role, SubjectPayload};
use crate::session::SessionStore;

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_SESSION_DB: &str = "./session.db";

type Input = Lines<BufReader<Stdin>>;

enum Leave {
    Logout,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logging();

    let base_url =
        env::var("UNIVERSITY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let db_path =
        env::var("UNIVERSITY_SESSION_DB").unwrap_or_else(|_| DEFAULT_SESSION_DB.to_string());

    let session = SessionStore::open(&db_path).context("Failed to open session store")?;
    let gateway: Arc<dyn Gateway> = Arc::new(ApiClient::new(&base_url, session.clone()));

    tracing::info!(base_url, "Starting university client");

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    // Silent re-authentication: a stored credential resolves its role before
    // any protected view shows; failure falls through to the login prompt.
    let mut next = auth::resume(gateway.as_ref(), &session).await?;
    let mut env_login_allowed = true;

    loop {
        let dispatch = match next.take() {
            Some(dispatch) => dispatch,
            None => {
                let attempt =
                    login_prompt(gateway.as_ref(), &session, &mut input, env_login_allowed)
                        .await?;
                env_login_allowed = false;
                match attempt {
                    Some(dispatch) => dispatch,
                    None => break,
                }
            }
        };

        // Entry into any role view requires a live credential.
        if session.get().is_none() {
            continue;
        }

        let leave = match dispatch.role {
            Role::Administrator => {
                admin_view(Arc::clone(&gateway), &dispatch, &mut input).await?
            }
            Role::Professor => professor_view(Arc::clone(&gateway), &dispatch, &mut input).await?,
            Role::Student => student_view(Arc::clone(&gateway), &dispatch, &mut input).await?,
            Role::Unknown => continue,
        };

        match leave {
            Leave::Logout => {
                session.clear()?;
                tracing::info!("Session cleared");
            }
            Leave::Quit => break,
        }
    }

    Ok(())
}

/// Asks for credentials until a dispatch succeeds or stdin closes. The env
/// credentials, when set, are tried once before falling back to the prompt.
async fn login_prompt(
    gateway: &dyn Gateway,
    session: &SessionStore,
    input: &mut Input,
    allow_env: bool,
) -> Result<Option<Dispatch>> {
    let mut env_tried = !allow_env;
    loop {
        let (username, password) = match env_credentials() {
            Some(credentials) if !env_tried => {
                env_tried = true;
                credentials
            }
            _ => {
                let Some(username) = ask(input, "username: ").await? else {
                    return Ok(None);
                };
                let Some(password) = ask(input, "password: ").await? else {
                    return Ok(None);
                };
                (username, password)
            }
        };

        match auth::login(gateway, session, &username, &password).await? {
            LoginOutcome::Dispatched(dispatch) => {
                println!(
                    "Signed in as {} ({})",
                    dispatch.profile.user.username, dispatch.role
                );
                return Ok(Some(dispatch));
            }
            LoginOutcome::Rejected(message) => println!("Login failed: {}", message),
            LoginOutcome::UnrecognizedRole => {
                println!("This account's role has no view in this client.")
            }
        }
    }
}

fn env_credentials() -> Option<(String, String)> {
    let username = env::var("UNIVERSITY_USERNAME").ok()?;
    let password = env::var("UNIVERSITY_PASSWORD").ok()?;
    Some((username, password))
}

async fn ask(input: &mut Input, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

fn parse_id(raw: Option<&str>) -> Option<i64> {
    raw?.parse().ok()
}

fn report(result: ApiResult<()>, success: &str) {
    match result {
        Ok(()) => println!("{}", success),
        Err(err) => println!("Request failed: {}", err),
    }
}

async fn professor_view(
    gateway: Arc<dyn Gateway>,
    dispatch: &Dispatch,
    input: &mut Input,
) -> Result<Leave> {
    let grading = Grading::new(gateway);

    println!();
    println!("Professor dashboard — {}", dispatch.profile.user.full_name());
    if let Some(faculty) = dispatch
        .profile
        .profile
        .as_ref()
        .and_then(|p| p.faculty.as_ref())
    {
        println!("Faculty: {}", faculty.name);
    }

    if let Err(err) = grading.load_subjects().await {
        println!("Failed to load subjects: {}", err);
    }
    print_taught_subjects(&grading);
    println!("Commands: list, open <subject>, grade <subject> <student> <value|->, note <subject> <student> <text>, save <subject> <student>, refresh, logout, quit");

    loop {
        let Some(line) = ask(input, "professor> ").await? else {
            return Ok(Leave::Quit);
        };
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("list") => {
                print_taught_subjects(&grading);
                if let Some(subject_id) = grading.expanded() {
                    print_roster(&grading, subject_id);
                }
            }
            Some("open") => match parse_id(parts.next()) {
                Some(subject_id) => match grading.expand(subject_id).await {
                    ExpandOutcome::Collapsed => println!("Closed subject {}", subject_id),
                    ExpandOutcome::Expanded { .. } => print_roster(&grading, subject_id),
                },
                None => println!("usage: open <subject-id>"),
            },
            Some("grade") => {
                match (parse_id(parts.next()), parse_id(parts.next()), parts.next()) {
                    (Some(subject_id), Some(student_id), Some(value)) => {
                        let raw = if value == "-" { "" } else { value };
                        if grading.edit_grade(subject_id, student_id, raw) {
                            println!("Pending grade updated; save to persist");
                        } else {
                            println!("No roster entry for that pair; open the subject first");
                        }
                    }
                    _ => println!("usage: grade <subject-id> <student-id> <value|->"),
                }
            }
            Some("note") => match (parse_id(parts.next()), parse_id(parts.next())) {
                (Some(subject_id), Some(student_id)) => {
                    let text = parts.collect::<Vec<_>>().join(" ");
                    if grading.edit_notes(subject_id, student_id, &text) {
                        println!("Pending notes updated; save to persist");
                    } else {
                        println!("No roster entry for that pair; open the subject first");
                    }
                }
                _ => println!("usage: note <subject-id> <student-id> <text>"),
            },
            Some("save") => match (parse_id(parts.next()), parse_id(parts.next())) {
                (Some(subject_id), Some(student_id)) => {
                    let grading = grading.clone();
                    tokio::spawn(async move {
                        match grading.save_grade(subject_id, student_id).await {
                            SaveOutcome::Saved => println!(
                                "Saved grade for student {} in subject {}",
                                student_id, subject_id
                            ),
                            SaveOutcome::Failed => println!(
                                "Save failed for student {} in subject {}; see logs",
                                student_id, subject_id
                            ),
                            SaveOutcome::AlreadySaving => {
                                println!("A save for that student is already in flight")
                            }
                            SaveOutcome::UnknownRecord => {
                                println!("No roster entry for that pair")
                            }
                        }
                    });
                }
                _ => println!("usage: save <subject-id> <student-id>"),
            },
            Some("refresh") => {
                if let Err(err) = grading.load_subjects().await {
                    println!("Failed to reload subjects: {}", err);
                }
                print_taught_subjects(&grading);
            }
            Some("logout") => return Ok(Leave::Logout),
            Some("quit") | Some("exit") => return Ok(Leave::Quit),
            Some(other) => println!("Unknown command: {}", other),
        }
    }
}

fn print_taught_subjects(grading: &Grading) {
    let subjects = grading.subjects();
    if subjects.is_empty() {
        println!("No subjects assigned.");
        return;
    }
    for subject in &subjects {
        let marker = if grading.expanded() == Some(subject.id) {
            "*"
        } else {
            " "
        };
        println!(
            "{} [{}] {} - {} ({} enrolled)",
            marker,
            subject.id,
            subject.code,
            subject.title,
            subject.students.len()
        );
    }
}

fn print_roster(grading: &Grading, subject_id: i64) {
    let Some(roster) = grading.roster(subject_id) else {
        println!("No roster loaded for subject {}", subject_id);
        return;
    };
    if roster.is_empty() {
        println!("No students in subject {}", subject_id);
        return;
    }
    for record in &roster {
        let grade = record
            .grade
            .map(|g| format!("{:.2}", g))
            .unwrap_or_else(|| "-".to_string());
        let notes = if record.notes.is_empty() {
            String::new()
        } else {
            format!("  [{}]", record.notes)
        };
        let saving = if grading.is_saving(subject_id, record.student.id) {
            "  (saving...)"
        } else {
            ""
        };
        println!(
            "  [{}] {} ({}): {}{}{}",
            record.student.id,
            record.student.user.full_name(),
            record.student.user.username,
            grade,
            notes,
            saving
        );
    }
}

async fn student_view(
    gateway: Arc<dyn Gateway>,
    dispatch: &Dispatch,
    input: &mut Input,
) -> Result<Leave> {
    let enrollment = Enrollment::new(gateway);

    if let Err(err) = enrollment.load_all().await {
        println!("Failed to load subjects: {}", err);
    }

    let profile = enrollment
        .profile()
        .unwrap_or_else(|| dispatch.profile.clone());
    println!();
    println!("Student dashboard — {}", profile.user.full_name());
    if let Some(details) = &profile.profile {
        if let Some(faculty) = &details.faculty {
            println!("Faculty: {}", faculty.name);
        }
        if let Some(year) = details.enrollment_year {
            println!("Enrollment year: {}", year);
        }
    }
    print_student_subjects(&enrollment);
    println!("Commands: list, filter <all|mine>, toggle <subject>, refresh, logout, quit");

    loop {
        let Some(line) = ask(input, "student> ").await? else {
            return Ok(Leave::Quit);
        };
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("list") => print_student_subjects(&enrollment),
            Some("filter") => match parts.next() {
                Some("all") => {
                    enrollment.set_filter(FilterMode::All);
                    print_student_subjects(&enrollment);
                }
                Some("mine") | Some("enrolled") => {
                    enrollment.set_filter(FilterMode::EnrolledOnly);
                    print_student_subjects(&enrollment);
                }
                _ => println!("usage: filter <all|mine>"),
            },
            Some("toggle") => match parse_id(parts.next()) {
                Some(subject_id) => {
                    let enrollment = enrollment.clone();
                    tokio::spawn(async move {
                        match enrollment.toggle(subject_id).await {
                            Ok(ToggleOutcome::Enrolled) => {
                                println!("Enrolled in subject {}", subject_id)
                            }
                            Ok(ToggleOutcome::Unenrolled) => {
                                println!("Unenrolled from subject {}", subject_id)
                            }
                            Ok(ToggleOutcome::Busy) => println!(
                                "Subject {} already has an action in flight",
                                subject_id
                            ),
                            Ok(ToggleOutcome::UnknownSubject) => {
                                println!("No subject {} in the list", subject_id)
                            }
                            Err(err) => println!("Enrollment action failed: {}", err),
                        }
                    });
                }
                None => println!("usage: toggle <subject-id>"),
            },
            Some("refresh") => {
                if let Err(err) = enrollment.load_all().await {
                    println!("Failed to reload: {}", err);
                }
                print_student_subjects(&enrollment);
            }
            Some("logout") => return Ok(Leave::Logout),
            Some("quit") | Some("exit") => return Ok(Leave::Quit),
            Some(other) => println!("Unknown command: {}", other),
        }
    }
}

fn print_student_subjects(enrollment: &Enrollment) {
    let all = enrollment.subjects().len();
    let mine = enrollment.enrolled_count();
    match enrollment.filter() {
        FilterMode::All => println!("All subjects ({}) — {} enrolled", all, mine),
        FilterMode::EnrolledOnly => println!("My subjects ({} of {})", mine, all),
    }
    let subjects = enrollment.filtered();
    if subjects.is_empty() {
        println!("Nothing to show.");
        return;
    }
    for subject in &subjects {
        let status = if enrollment.is_busy(subject.id) {
            "working..."
        } else if subject.enrolled {
            "enrolled"
        } else {
            "-"
        };
        let professor = subject
            .professor
            .as_ref()
            .map(|p| p.user.full_name())
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "  [{}] {} - {} (professor: {}) [{}]",
            subject.id, subject.code, subject.title, professor, status
        );
    }
}

async fn admin_view(
    gateway: Arc<dyn Gateway>,
    dispatch: &Dispatch,
    input: &mut Input,
) -> Result<Leave> {
    let admin = Admin::new(gateway);

    println!();
    println!(
        "Administrator dashboard — {}",
        dispatch.profile.user.full_name()
    );
    if let Err(err) = admin.load_all().await {
        println!("Failed to load data: {}", err);
    }
    print_admin_overview(&admin);
    println!("Commands: faculties, subjects, professors, students,");
    println!("  add-faculty <name>, edit-faculty <id> <name>, del-faculty <id>,");
    println!("  add-subject <code> <faculty-id> <professor-id|-> <title>,");
    println!("  edit-subject <id> <code> <faculty-id> <professor-id|-> <title>,");
    println!("  del-subject <id>, del-professor <id>, del-student <id>, refresh, logout, quit");

    loop {
        let Some(line) = ask(input, "admin> ").await? else {
            return Ok(Leave::Quit);
        };
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}
            Some("faculties") => {
                for faculty in admin.faculties() {
                    println!("  [{}] {}", faculty.id, faculty.name);
                }
            }
            Some("subjects") => {
                for subject in admin.subjects() {
                    let faculty = subject
                        .faculty
                        .as_ref()
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| "N/A".to_string());
                    let professor = subject
                        .professor
                        .as_ref()
                        .map(|p| p.user.full_name())
                        .unwrap_or_else(|| "unassigned".to_string());
                    println!(
                        "  [{}] {} - {} (faculty: {}, professor: {})",
                        subject.id, subject.code, subject.title, faculty, professor
                    );
                }
            }
            Some("professors") => {
                for professor in admin.professors() {
                    println!(
                        "  [{}] {} ({})",
                        professor.id,
                        professor.user.full_name(),
                        professor.office.as_deref().unwrap_or("no office")
                    );
                }
            }
            Some("students") => {
                for student in admin.students() {
                    let year = student
                        .enrollment_year
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    println!(
                        "  [{}] {} (year {})",
                        student.id,
                        student.user.full_name(),
                        year
                    );
                }
            }
            Some("add-faculty") => {
                let name = parts.collect::<Vec<_>>().join(" ");
                if name.is_empty() {
                    println!("usage: add-faculty <name>");
                } else {
                    report(admin.save_faculty(None, &name).await, "Faculty saved");
                }
            }
            Some("edit-faculty") => match parse_id(parts.next()) {
                Some(id) => {
                    let name = parts.collect::<Vec<_>>().join(" ");
                    if name.is_empty() {
                        println!("usage: edit-faculty <id> <name>");
                    } else {
                        report(admin.save_faculty(Some(id), &name).await, "Faculty saved");
                    }
                }
                None => println!("usage: edit-faculty <id> <name>"),
            },
            Some("add-subject") => match parse_subject_args(&mut parts) {
                Some(payload) => {
                    report(admin.save_subject(None, payload).await, "Subject saved")
                }
                None => {
                    println!("usage: add-subject <code> <faculty-id> <professor-id|-> <title>")
                }
            },
            Some("edit-subject") => match parse_id(parts.next()) {
                Some(id) => match parse_subject_args(&mut parts) {
                    Some(payload) => {
                        report(admin.save_subject(Some(id), payload).await, "Subject saved")
                    }
                    None => println!(
                        "usage: edit-subject <id> <code> <faculty-id> <professor-id|-> <title>"
                    ),
                },
                None => println!(
                    "usage: edit-subject <id> <code> <faculty-id> <professor-id|-> <title>"
                ),
            },
            Some("del-faculty") => match parse_id(parts.next()) {
                Some(id) => report(admin.delete_faculty(id).await, "Faculty deleted"),
                None => println!("usage: del-faculty <id>"),
            },
            Some("del-subject") => match parse_id(parts.next()) {
                Some(id) => report(admin.delete_subject(id).await, "Subject deleted"),
                None => println!("usage: del-subject <id>"),
            },
            Some("del-professor") => match parse_id(parts.next()) {
                Some(id) => report(admin.delete_professor(id).await, "Professor deleted"),
                None => println!("usage: del-professor <id>"),
            },
            Some("del-student") => match parse_id(parts.next()) {
                Some(id) => report(admin.delete_student(id).await, "Student deleted"),
                None => println!("usage: del-student <id>"),
            },
            Some("refresh") => {
                if let Err(err) = admin.load_all().await {
                    println!("Failed to reload: {}", err);
                }
                print_admin_overview(&admin);
            }
            Some("logout") => return Ok(Leave::Logout),
            Some("quit") | Some("exit") => return Ok(Leave::Quit),
            Some(other) => println!("Unknown command: {}", other),
        }
    }
}

fn print_admin_overview(admin: &Admin) {
    println!(
        "{} faculties, {} subjects, {} professors, {} students loaded",
        admin.faculties().len(),
        admin.subjects().len(),
        admin.professors().len(),
        admin.students().len()
    );
}

fn parse_subject_args(parts: &mut std::str::SplitWhitespace<'_>) -> Option<SubjectPayload> {
    let code = parts.next()?.to_string();
    let faculty = parts.next()?.parse().ok()?;
    let professor = match parts.next()? {
        "-" => None,
        raw => Some(raw.parse().ok()?),
    };
    let title = parts.collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return None;
    }
    Some(SubjectPayload {
        code,
        title,
        faculty,
        professor,
    })
}
