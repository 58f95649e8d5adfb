use application_ports::guild_available::{
    GrantReport, GrantSummary, GuildAvailable, GuildAvailableError, GuildAvailablePort,
};
use async_trait::async_trait;
use domain::guild_state::{GrantDecision, GuildState};
use domain::ports::discord::{DiscordError, DiscordPort, Member};
use domain::roster::{RosterEntries, RosterEntry, RosterError, RosterRepository};
use domain_shared::discord::{GuildId, RoleId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Discord returns at most 1000 members per request.
pub const MEMBERS_PER_REQUEST: u64 = 1000;

const GRANT_REASON: &str = "Role granted from roster";

pub struct RoleGrantService {
    discord_port: Arc<dyn DiscordPort + Send + Sync>,
    roster_repository: Arc<dyn RosterRepository + Send + Sync>,
    in_progress: Mutex<()>,
}

impl RoleGrantService {
    #[instrument(level = "trace", skip_all)]
    pub fn new(
        discord_port: Arc<dyn DiscordPort + Send + Sync>,
        roster_repository: Arc<dyn RosterRepository + Send + Sync>,
    ) -> Self {
        Self {
            discord_port,
            roster_repository,
            in_progress: Mutex::new(()),
        }
    }

    #[instrument(level = "debug", skip(self, event), fields(guild_id = event.guild_id.0))]
    async fn load_guild_state(
        &self,
        event: GuildAvailable,
    ) -> Result<GuildState, GuildAvailableError> {
        let members = self.find_all_members(event.guild_id).await?;
        let state = GuildState::new(event.guild_id, event.roles, members);

        info!(
            guild_id = event.guild_id.0,
            roles = state.role_count(),
            members = state.member_count(),
            "Guild state loaded",
        );

        Ok(state)
    }

    #[instrument(level = "debug", skip(self))]
    async fn find_all_members(
        &self,
        guild_id: GuildId,
    ) -> Result<Vec<Member>, GuildAvailableError> {
        let mut members = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = self
                .discord_port
                .find_members_page(guild_id, after, MEMBERS_PER_REQUEST)
                .await
                .map_err(map_discord_err)?;

            let fetched = page.len();
            after = page.last().map(|member| member.user_id);
            members.extend(page);

            debug!(
                guild_id = guild_id.0,
                "Fetched {} members (total so far: {})",
                fetched,
                members.len(),
            );

            if fetched < MEMBERS_PER_REQUEST as usize {
                break;
            }
        }

        Ok(members)
    }

    #[instrument(level = "debug", skip_all, fields(guild_id = state.guild_id().0))]
    async fn grant_roles(
        &self,
        state: &GuildState,
        entries: RosterEntries,
    ) -> Result<GrantSummary, GuildAvailableError> {
        let mut summary = GrantSummary::default();

        for entry in entries {
            let entry = entry.map_err(map_roster_err)?;

            match state.decide(&entry) {
                GrantDecision::UnknownMember => {
                    debug!(
                        line = entry.line,
                        "Skipping {}: not a member of this guild", entry.handle,
                    );
                    summary.unknown_members += 1;
                }
                GrantDecision::UnknownRole => {
                    error!(
                        line = entry.line,
                        "Unknown role {} for {}", entry.role_name, entry.handle,
                    );
                    summary.unknown_roles += 1;
                }
                GrantDecision::Grant { user_id, role_id } => {
                    if self.grant(state.guild_id(), &entry, user_id, role_id).await {
                        summary.granted += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    #[instrument(level = "trace", skip(self, entry))]
    async fn grant(
        &self,
        guild_id: GuildId,
        entry: &RosterEntry,
        user_id: UserId,
        role_id: RoleId,
    ) -> bool {
        match self
            .discord_port
            .add_member_role(guild_id, user_id, role_id, GRANT_REASON)
            .await
        {
            Ok(()) => {
                info!(
                    user_id = user_id.0,
                    role_id = role_id.0,
                    "Added {} to Role {}",
                    entry.handle,
                    entry.role_name,
                );
                true
            }
            Err(err) => {
                error!(
                    user_id = user_id.0,
                    role_id = role_id.0,
                    "Failed to add {} to Role {}: {}",
                    entry.handle,
                    entry.role_name,
                    err,
                );
                false
            }
        }
    }
}

#[async_trait]
impl GuildAvailablePort for RoleGrantService {
    #[instrument(level = "info", skip(self, event), fields(guild_id = event.guild_id.0))]
    async fn guild_available(
        &self,
        event: GuildAvailable,
    ) -> Result<GrantReport, GuildAvailableError> {
        let _in_progress = self.in_progress.lock().await;

        if event.unavailable {
            warn!(
                guild_id = event.guild_id.0,
                "Guild is temporarily unavailable, skipping role grants",
            );
            return Ok(GrantReport::Skipped);
        }

        // Opened before any Discord call so a missing roster costs nothing.
        let entries = self.roster_repository.open().map_err(map_roster_err)?;

        let state = self.load_guild_state(event).await?;
        let summary = self.grant_roles(&state, entries).await?;

        info!(
            guild_id = state.guild_id().0,
            granted = summary.granted,
            failed = summary.failed,
            unknown_members = summary.unknown_members,
            unknown_roles = summary.unknown_roles,
            "Roster processed",
        );

        Ok(GrantReport::Completed(summary))
    }
}

#[instrument(level = "trace", skip_all)]
fn map_discord_err(err: DiscordError) -> GuildAvailableError {
    error!("Failed to fetch guild members: {}", err);
    GuildAvailableError::DiscordUnavailable
}

#[instrument(level = "trace", skip_all)]
fn map_roster_err(err: RosterError) -> GuildAvailableError {
    match err {
        RosterError::Unavailable(reason) => {
            error!("RosterError::Unavailable: {}", reason);
            GuildAvailableError::RosterUnavailable(reason)
        }
        RosterError::Malformed { line, reason } => {
            error!(line, "RosterError::Malformed: {}", reason);
            GuildAvailableError::MalformedRoster { line, reason }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ports::discord::{MockDiscordPort, Role};
    use domain::roster::MockRosterRepository;
    use std::io::Write;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    const GUILD: GuildId = GuildId(7);

    fn role(id: u64, name: &str) -> Role {
        Role {
            role_id: RoleId(id),
            name: name.to_string(),
        }
    }

    fn member(id: u64, username: &str, discriminator: u16) -> Member {
        Member {
            user_id: UserId(id),
            username: username.to_string(),
            discriminator: Some(discriminator),
        }
    }

    fn event(roles: Vec<Role>) -> GuildAvailable {
        GuildAvailable {
            guild_id: GUILD,
            unavailable: false,
            roles,
        }
    }

    fn roster(rows: &[(&str, &str)]) -> MockRosterRepository {
        let rows: Vec<(String, String)> = rows
            .iter()
            .map(|(handle, role_name)| (handle.to_string(), role_name.to_string()))
            .collect();

        let mut repository = MockRosterRepository::new();
        repository.expect_open().returning(move || {
            let entries: Vec<Result<RosterEntry, RosterError>> = rows
                .iter()
                .enumerate()
                .map(|(index, (handle, role_name))| {
                    Ok(RosterEntry {
                        line: index as u64 + 1,
                        handle: handle.clone(),
                        role_name: role_name.clone(),
                    })
                })
                .collect();
            let entries: RosterEntries = Box::new(entries.into_iter());
            Ok(entries)
        });
        repository
    }

    fn service(discord: MockDiscordPort, roster: MockRosterRepository) -> RoleGrantService {
        RoleGrantService::new(Arc::new(discord), Arc::new(roster))
    }

    /// Collects formatted log output of the current thread.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(self.clone())
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn expect_grant(discord: &mut MockDiscordPort, user: u64, role: u64) {
        discord
            .expect_add_member_role()
            .withf(move |guild_id, user_id, role_id, _| {
                *guild_id == GUILD && *user_id == UserId(user) && *role_id == RoleId(role)
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
    }

    #[tokio::test]
    async fn known_member_and_role_are_granted_once() {
        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .times(1)
            .returning(|_, _, _| Ok(vec![member(111, "alice", 1)]));
        expect_grant(&mut discord, 111, 222);

        let service = service(discord, roster(&[("alice#0001", "Admin")]));

        let report = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();

        assert_eq!(
            report,
            GrantReport::Completed(GrantSummary {
                granted: 1,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn unknown_role_is_reported_without_a_call() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .returning(|_, _, _| Ok(vec![member(111, "alice", 1)]));
        discord.expect_add_member_role().never();

        let service = service(discord, roster(&[("alice#0001", "Member")]));

        let report = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();

        assert_eq!(
            report,
            GrantReport::Completed(GrantSummary {
                unknown_roles: 1,
                ..Default::default()
            })
        );
        let logs = logs.contents();
        assert!(logs.contains("ERROR"), "{logs}");
        assert!(logs.contains("Unknown role Member for alice#0001"), "{logs}");
    }

    #[tokio::test]
    async fn alice_and_bob_roster_issues_no_calls() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .returning(|_, _, _| Ok(vec![member(111, "alice", 1)]));
        discord.expect_add_member_role().never();

        let service = service(
            discord,
            roster(&[("alice#0001", "Member"), ("bob#0002", "Admin")]),
        );

        let report = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();

        assert_eq!(
            report,
            GrantReport::Completed(GrantSummary {
                granted: 0,
                failed: 0,
                unknown_members: 1,
                unknown_roles: 1,
            })
        );
        let logs = logs.contents();
        assert!(logs.contains("Unknown role Member for alice#0001"), "{logs}");
        assert!(!logs.contains("bob#0002"), "{logs}");
    }

    #[tokio::test]
    async fn unavailable_guild_is_skipped() {
        let mut discord = MockDiscordPort::new();
        discord.expect_find_members_page().never();
        discord.expect_add_member_role().never();
        let mut roster = MockRosterRepository::new();
        roster.expect_open().never();

        let service = service(discord, roster);

        let report = service
            .guild_available(GuildAvailable {
                guild_id: GUILD,
                unavailable: true,
                roles: vec![role(222, "Admin")],
            })
            .await
            .unwrap();

        assert_eq!(report, GrantReport::Skipped);
    }

    #[tokio::test]
    async fn missing_roster_fails_before_any_discord_call() {
        let mut discord = MockDiscordPort::new();
        discord.expect_find_members_page().never();
        discord.expect_add_member_role().never();
        let mut roster = MockRosterRepository::new();
        roster
            .expect_open()
            .times(1)
            .returning(|| Err(RosterError::Unavailable("testers.csv: not found".to_string())));

        let service = service(discord, roster);

        let error = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap_err();

        assert!(matches!(error, GuildAvailableError::RosterUnavailable(_)));
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn malformed_row_stops_processing() {
        let mut discord = MockDiscordPort::new();
        discord.expect_find_members_page().returning(|_, _, _| {
            Ok(vec![member(111, "alice", 1), member(333, "carol", 3)])
        });
        expect_grant(&mut discord, 111, 222);
        discord
            .expect_add_member_role()
            .withf(|_, user_id, _, _| *user_id == UserId(333))
            .never();

        let mut roster = MockRosterRepository::new();
        roster.expect_open().returning(|| {
            let entries: Vec<Result<RosterEntry, RosterError>> = vec![
                Ok(RosterEntry {
                    line: 1,
                    handle: "alice#0001".to_string(),
                    role_name: "Admin".to_string(),
                }),
                Err(RosterError::Malformed {
                    line: 2,
                    reason: "expected 2 fields, found 3".to_string(),
                }),
                Ok(RosterEntry {
                    line: 3,
                    handle: "carol#0003".to_string(),
                    role_name: "Admin".to_string(),
                }),
            ];
            let entries: RosterEntries = Box::new(entries.into_iter());
            Ok(entries)
        });

        let service = service(discord, roster);

        let error = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            GuildAvailableError::MalformedRoster { line: 2, .. }
        ));
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn members_are_fetched_across_pages() {
        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .withf(|guild_id, _, limit| *guild_id == GUILD && *limit == MEMBERS_PER_REQUEST)
            .times(2)
            .returning(|_, after, _| match after {
                None => Ok((1..=1000)
                    .map(|id| member(id, &format!("user{id}"), 1))
                    .collect()),
                Some(UserId(1000)) => Ok(vec![member(1001, "late", 42)]),
                Some(other) => panic!("unexpected cursor {other:?}"),
            });
        expect_grant(&mut discord, 1001, 222);

        let service = service(discord, roster(&[("late#0042", "Admin")]));

        let report = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();

        assert_eq!(
            report,
            GrantReport::Completed(GrantSummary {
                granted: 1,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn full_last_page_is_followed_by_an_empty_page() {
        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .times(2)
            .returning(|_, after, _| match after {
                None => Ok((1..=1000)
                    .map(|id| member(id, &format!("user{id}"), 1))
                    .collect()),
                Some(_) => Ok(vec![]),
            });
        expect_grant(&mut discord, 1000, 222);

        let service = service(discord, roster(&[("user1000#0001", "Admin")]));

        service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn member_fetch_failure_is_not_fatal() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .returning(|_, _, _| Err(DiscordError::DiscordUnavailable("timed out".to_string())));
        discord.expect_add_member_role().never();

        let service = service(discord, roster(&[("alice#0001", "Admin")]));

        let error = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap_err();

        assert!(matches!(error, GuildAvailableError::DiscordUnavailable));
        assert!(!error.is_fatal());
        let logs = logs.contents();
        assert_eq!(logs.matches("ERROR").count(), 1, "{logs}");
        assert!(logs.contains("Failed to fetch guild members: Discord is unavailable: timed out"), "{logs}");
    }

    #[tokio::test]
    async fn failed_grant_does_not_stop_the_roster() {
        let mut discord = MockDiscordPort::new();
        discord
            .expect_find_members_page()
            .returning(|_, _, _| Ok(vec![member(111, "alice", 1), member(333, "carol", 3)]));
        discord
            .expect_add_member_role()
            .withf(|_, user_id, _, _| *user_id == UserId(111))
            .times(1)
            .returning(|_, _, _, _| {
                Err(DiscordError::Rejected {
                    status: 403,
                    message: "Missing Permissions".to_string(),
                })
            });
        expect_grant(&mut discord, 333, 222);

        let service = service(
            discord,
            roster(&[("alice#0001", "Admin"), ("carol#0003", "Admin")]),
        );

        let report = service
            .guild_available(event(vec![role(222, "Admin")]))
            .await
            .unwrap();

        assert_eq!(
            report,
            GrantReport::Completed(GrantSummary {
                granted: 1,
                failed: 1,
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn earlier_guild_state_does_not_leak_into_later_events() {
        let mut discord = MockDiscordPort::new();
        let mut calls = 0;
        discord
            .expect_find_members_page()
            .times(2)
            .returning(move |_, _, _| {
                calls += 1;
                if calls == 1 {
                    Ok(vec![member(111, "alice", 1)])
                } else {
                    Ok(vec![member(444, "bob", 2)])
                }
            });
        expect_grant(&mut discord, 111, 222);
        expect_grant(&mut discord, 444, 555);

        let service = service(
            discord,
            roster(&[("alice#0001", "Member"), ("bob#0002", "Member")]),
        );

        let first = service
            .guild_available(event(vec![role(222, "Member")]))
            .await
            .unwrap();
        let second = service
            .guild_available(event(vec![role(555, "Member")]))
            .await
            .unwrap();

        let expected = GrantReport::Completed(GrantSummary {
            granted: 1,
            unknown_members: 1,
            ..Default::default()
        });
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    type Journal = Arc<std::sync::Mutex<Vec<&'static str>>>;

    struct JournalingRoster(Journal);

    impl RosterRepository for JournalingRoster {
        fn open(&self) -> Result<RosterEntries, RosterError> {
            self.0.lock().unwrap().push("roster opened");
            let entries: Vec<Result<RosterEntry, RosterError>> = vec![Ok(RosterEntry {
                line: 1,
                handle: "alice#0001".to_string(),
                role_name: "Admin".to_string(),
            })];
            Ok(Box::new(entries.into_iter()))
        }
    }

    /// Suspends inside every member fetch so a concurrent event gets a chance
    /// to run.
    struct SlowDiscord(Journal);

    #[async_trait]
    impl DiscordPort for SlowDiscord {
        async fn find_members_page(
            &self,
            _guild_id: GuildId,
            _after: Option<UserId>,
            _limit: u64,
        ) -> Result<Vec<Member>, DiscordError> {
            self.0.lock().unwrap().push("members requested");
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.0.lock().unwrap().push("members received");
            Ok(vec![member(111, "alice", 1)])
        }

        async fn add_member_role(
            &self,
            _guild_id: GuildId,
            _user_id: UserId,
            _role_id: RoleId,
            _reason: &str,
        ) -> Result<(), DiscordError> {
            self.0.lock().unwrap().push("role added");
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_events_are_handled_one_at_a_time() {
        let journal = Journal::default();
        let service = RoleGrantService::new(
            Arc::new(SlowDiscord(journal.clone())),
            Arc::new(JournalingRoster(journal.clone())),
        );

        let (first, second) = tokio::join!(
            service.guild_available(event(vec![role(222, "Admin")])),
            service.guild_available(event(vec![role(222, "Admin")])),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        let one_event = ["roster opened", "members requested", "members received", "role added"];
        assert_eq!(*journal.lock().unwrap(), [one_event, one_event].concat());
    }
}
