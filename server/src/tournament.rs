//! Single elimination tournaments.
//!
//! The engine owns registration, bracket generation and round advancement. It never
//! touches rooms or the network: starting a round is split into [`TournamentEngine::plan_start`]
//! (or an [`Advancement::NextRound`]) which decides the pairings, and
//! [`TournamentEngine::commit_round`] which records them once the caller has reserved
//! a room code for every real match. A round is therefore either created whole or
//! not at all.
//!
//! Pairing is uniformly random, without seeding. An odd entrant out gets a bye: a
//! match created already finished with that entrant as winner and no room.

use crate::error::{ArenaError, Result};
use crate::room::TournamentBinding;
use arena_shared::protocol::{
    MatchStatus, MatchView, ParticipantView, TournamentStatus, TournamentView,
};
use arena_shared::{MatchId, ParticipantId, TournamentId, UserId};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 64;
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub user: UserId,
    pub username: String,
    pub eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketMatch {
    pub id: MatchId,
    pub round: u32,
    /// The second seat is empty for a bye.
    pub players: [Option<ParticipantId>; 2],
    pub winner: Option<ParticipantId>,
    pub scores: [u32; 2],
    pub status: MatchStatus,
    pub room_code: Option<String>,
}

impl BracketMatch {
    pub fn is_bye(&self) -> bool {
        self.players[1].is_none()
    }

    fn view(&self) -> MatchView {
        MatchView {
            id: self.id,
            round: self.round,
            player1: self.players[0],
            player2: self.players[1],
            winner: self.winner,
            scores: self.scores,
            status: self.status,
            room_code: self.room_code.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub creator: UserId,
    pub max_participants: u32,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub participants: Vec<Participant>,
    pub matches: Vec<BracketMatch>,
    pub champion: Option<ParticipantId>,
}

impl Tournament {
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_of(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user == user)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() as u32 >= self.max_participants
    }

    pub fn round_matches(&self, round: u32) -> impl Iterator<Item = &BracketMatch> {
        self.matches.iter().filter(move |m| m.round == round)
    }

    /// Re-evaluated from the match table on every call.
    pub fn round_complete(&self, round: u32) -> bool {
        let mut matches = self.round_matches(round).peekable();
        matches.peek().is_some() && matches.all(|m| m.status == MatchStatus::Finished)
    }

    fn round_winners(&self, round: u32) -> Vec<ParticipantId> {
        self.round_matches(round).filter_map(|m| m.winner).collect()
    }

    pub fn view(&self) -> TournamentView {
        TournamentView {
            id: self.id,
            name: self.name.clone(),
            creator_id: self.creator,
            max_participants: self.max_participants,
            status: self.status,
            current_round: self.current_round,
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantView {
                    id: p.id,
                    user_id: p.user,
                    username: p.username.clone(),
                    eliminated: p.eliminated,
                })
                .collect(),
            matches: self.matches.iter().map(BracketMatch::view).collect(),
            champion: self.champion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pairing {
    Match([ParticipantId; 2]),
    Bye(ParticipantId),
}

/// Pairings of one round, not yet recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    pub tournament_id: TournamentId,
    pub round: u32,
    pub pairings: Vec<Pairing>,
}

impl RoundPlan {
    pub fn rooms_needed(&self) -> usize {
        self.pairings
            .iter()
            .filter(|p| matches!(p, Pairing::Match(_)))
            .count()
    }
}

/// A recorded bracket match waiting for its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub tournament_id: TournamentId,
    pub match_id: MatchId,
    pub round: u32,
    pub room_code: String,
    pub participants: [ParticipantId; 2],
    pub users: [UserId; 2],
    pub usernames: [String; 2],
    pub has_next_match: bool,
}

impl Assignment {
    pub fn binding(&self) -> TournamentBinding {
        TournamentBinding {
            tournament_id: self.tournament_id,
            match_id: self.match_id,
            participants: self.participants,
            has_next_match: self.has_next_match,
        }
    }
}

/// What recording a match result did to its tournament.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advancement {
    /// Other matches of the round are still being played.
    Pending,
    /// The round is complete and these pairings come next.
    NextRound(RoundPlan),
    Finished { champion: Option<ParticipantId> },
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub tournament: TournamentView,
    /// The join filled the last seat.
    pub full: bool,
}

pub struct TournamentEngine {
    tournaments: BTreeMap<TournamentId, Tournament>,
    match_index: HashMap<MatchId, TournamentId>,
    next_tournament_id: u64,
    next_participant_id: u64,
    next_match_id: u64,
    rng: StdRng,
}

impl Default for TournamentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TournamentEngine {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Engine with a fixed shuffle sequence.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            tournaments: BTreeMap::new(),
            match_index: HashMap::new(),
            next_tournament_id: 1,
            next_participant_id: 1,
            next_match_id: 1,
            rng,
        }
    }

    pub fn get(&self, id: TournamentId) -> Option<&Tournament> {
        self.tournaments.get(&id)
    }

    pub fn view(&self, id: TournamentId) -> Result<TournamentView> {
        self.tournament(id).map(Tournament::view)
    }

    /// Every tournament that has not finished, oldest first.
    pub fn list(&self) -> Vec<TournamentView> {
        self.tournaments
            .values()
            .filter(|t| t.status != TournamentStatus::Finished)
            .map(Tournament::view)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tournaments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tournaments.is_empty()
    }

    /// Creates a tournament with its creator enrolled as the first participant.
    pub fn create(
        &mut self,
        name: &str,
        max_participants: u32,
        creator: UserId,
        creator_name: &str,
    ) -> Result<TournamentView> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(ArenaError::invalid_payload(format!(
                "tournament name must be 1 to {} characters",
                MAX_NAME_LEN
            )));
        }
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&max_participants) {
            return Err(ArenaError::invalid_payload(format!(
                "maxParticipants must be between {} and {}",
                MIN_PARTICIPANTS, MAX_PARTICIPANTS
            )));
        }

        let id = TournamentId(self.next_tournament_id);
        self.next_tournament_id += 1;
        let creator_participant = self.new_participant(creator, creator_name);

        let tournament = Tournament {
            id,
            name: name.to_string(),
            creator,
            max_participants,
            status: TournamentStatus::Pending,
            current_round: 0,
            participants: vec![creator_participant],
            matches: Vec::new(),
            champion: None,
        };
        info!(
            "Tournament {} '{}' created by user {} for {} players",
            id, tournament.name, creator, max_participants
        );

        let view = tournament.view();
        self.tournaments.insert(id, tournament);
        Ok(view)
    }

    pub fn join(&mut self, id: TournamentId, user: UserId, username: &str) -> Result<JoinOutcome> {
        let participant_id = ParticipantId(self.next_participant_id);
        let tournament = self.tournament_mut(id)?;

        if tournament.status != TournamentStatus::Pending {
            return Err(ArenaError::not_joinable(format!("tournament {}", id)));
        }
        if tournament.participant_of(user).is_some() {
            return Err(ArenaError::AlreadyJoined { id, user });
        }
        if tournament.is_full() {
            return Err(ArenaError::CapacityExceeded {
                id,
                max: tournament.max_participants,
            });
        }

        tournament.participants.push(Participant {
            id: participant_id,
            user,
            username: username.to_string(),
            eliminated: false,
        });
        let full = tournament.is_full();
        info!(
            "User {} joined tournament {} ({}/{})",
            user,
            id,
            tournament.participants.len(),
            tournament.max_participants
        );
        let view = tournament.view();

        self.next_participant_id += 1;
        Ok(JoinOutcome {
            tournament: view,
            full,
        })
    }

    /// Validates a start request and draws the first round.
    pub fn plan_start(&mut self, id: TournamentId, requester: UserId) -> Result<RoundPlan> {
        let tournament = self.tournament(id)?;
        if tournament.creator != requester {
            return Err(ArenaError::NotCreator { id });
        }
        if tournament.status != TournamentStatus::Pending {
            return Err(ArenaError::not_joinable(format!("tournament {}", id)));
        }
        let joined = tournament.participants.len() as u32;
        if joined < tournament.max_participants {
            return Err(ArenaError::InsufficientParticipants {
                id,
                joined,
                required: tournament.max_participants,
            });
        }

        let entrants = tournament.participants.iter().map(|p| p.id).collect();
        Ok(self.pair(id, 1, entrants))
    }

    fn pair(&mut self, tournament_id: TournamentId, round: u32, mut entrants: Vec<ParticipantId>) -> RoundPlan {
        entrants.shuffle(&mut self.rng);
        let pairings = entrants
            .chunks(2)
            .map(|pair| match *pair {
                [a, b] => Pairing::Match([a, b]),
                _ => Pairing::Bye(pair[0]),
            })
            .collect();

        RoundPlan {
            tournament_id,
            round,
            pairings,
        }
    }

    /// Records a planned round. `codes` must hold one room code per real match.
    ///
    /// Fails without changing anything when the plan no longer fits the bracket,
    /// e.g. when the same round was already committed.
    pub fn commit_round(&mut self, plan: &RoundPlan, codes: Vec<String>) -> Result<Vec<Assignment>> {
        if codes.len() != plan.rooms_needed() {
            return Err(ArenaError::invalid_payload(format!(
                "round needs {} room codes, got {}",
                plan.rooms_needed(),
                codes.len()
            )));
        }

        let tournament = self.tournament(plan.tournament_id)?;
        let expected_round = match tournament.status {
            TournamentStatus::Pending => 1,
            TournamentStatus::Ongoing if tournament.round_complete(tournament.current_round) => {
                tournament.current_round + 1
            }
            _ => 0,
        };
        if plan.round != expected_round {
            return Err(ArenaError::not_joinable(format!(
                "round {} of tournament {}",
                plan.round, plan.tournament_id
            )));
        }

        let first_match_id = self.next_match_id;
        self.next_match_id += plan.pairings.len() as u64;
        let has_next_match = plan.pairings.len() > 1;

        let tournament = self.tournament_mut(plan.tournament_id)?;
        let mut codes = codes.into_iter();
        let mut assignments = Vec::new();
        let mut match_ids = Vec::new();

        for (offset, pairing) in plan.pairings.iter().enumerate() {
            let id = MatchId(first_match_id + offset as u64);
            match_ids.push(id);

            match pairing {
                Pairing::Bye(lone) => {
                    debug!("Tournament {}: participant {} has a bye", plan.tournament_id, lone);
                    tournament.matches.push(BracketMatch {
                        id,
                        round: plan.round,
                        players: [Some(*lone), None],
                        winner: Some(*lone),
                        scores: [0, 0],
                        status: MatchStatus::Finished,
                        room_code: None,
                    });
                }
                Pairing::Match(pair) => {
                    let Some(room_code) = codes.next() else {
                        break;
                    };
                    let [first, second] = [pair[0], pair[1]].map(|id| {
                        tournament
                            .participant(id)
                            .map(|p| (p.user, p.username.clone()))
                            .unwrap_or((UserId(0), String::new()))
                    });

                    tournament.matches.push(BracketMatch {
                        id,
                        round: plan.round,
                        players: [Some(pair[0]), Some(pair[1])],
                        winner: None,
                        scores: [0, 0],
                        status: MatchStatus::Ongoing,
                        room_code: Some(room_code.clone()),
                    });
                    assignments.push(Assignment {
                        tournament_id: plan.tournament_id,
                        match_id: id,
                        round: plan.round,
                        room_code,
                        participants: *pair,
                        users: [first.0, second.0],
                        usernames: [first.1, second.1],
                        has_next_match,
                    });
                }
            }
        }

        tournament.status = TournamentStatus::Ongoing;
        tournament.current_round = plan.round;
        info!(
            "Tournament {}: round {} started with {} matches",
            plan.tournament_id,
            plan.round,
            plan.pairings.len()
        );

        for id in match_ids {
            self.match_index.insert(id, plan.tournament_id);
        }
        Ok(assignments)
    }

    /// Records the result of a played bracket match and advances the bracket when it
    /// completes the round. Only the last finishing match of a round can advance it.
    pub fn record_result(
        &mut self,
        match_id: MatchId,
        scores: [u32; 2],
        winner: ParticipantId,
    ) -> Result<Advancement> {
        let tournament_id = *self
            .match_index
            .get(&match_id)
            .ok_or_else(|| ArenaError::invalid_payload(format!("unknown match {}", match_id)))?;
        let tournament = self.tournament_mut(tournament_id)?;

        let bracket_match = tournament
            .matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| ArenaError::invalid_payload(format!("unknown match {}", match_id)))?;
        if bracket_match.status != MatchStatus::Ongoing {
            return Err(ArenaError::not_joinable(format!("match {}", match_id)));
        }
        let loser = match bracket_match.players {
            [Some(a), Some(b)] if a == winner => b,
            [Some(a), Some(b)] if b == winner => a,
            _ => {
                return Err(ArenaError::invalid_payload(format!(
                    "participant {} did not play match {}",
                    winner, match_id
                )))
            }
        };

        bracket_match.scores = scores;
        bracket_match.winner = Some(winner);
        bracket_match.status = MatchStatus::Finished;
        let round = bracket_match.round;

        if let Some(participant) = tournament.participants.iter_mut().find(|p| p.id == loser) {
            participant.eliminated = true;
        }
        info!(
            "Tournament {}: match {} won by participant {} ({}-{})",
            tournament_id, match_id, winner, scores[0], scores[1]
        );

        if round != tournament.current_round || !tournament.round_complete(round) {
            return Ok(Advancement::Pending);
        }

        let winners = tournament.round_winners(round);
        if winners.len() <= 1 {
            tournament.status = TournamentStatus::Finished;
            tournament.champion = winners.first().copied();
            info!(
                "Tournament {} finished, champion {:?}",
                tournament_id, tournament.champion
            );
            return Ok(Advancement::Finished {
                champion: tournament.champion,
            });
        }

        Ok(Advancement::NextRound(self.pair(tournament_id, round + 1, winners)))
    }

    fn new_participant(&mut self, user: UserId, username: &str) -> Participant {
        let id = ParticipantId(self.next_participant_id);
        self.next_participant_id += 1;
        Participant {
            id,
            user,
            username: username.to_string(),
            eliminated: false,
        }
    }

    fn tournament(&self, id: TournamentId) -> Result<&Tournament> {
        self.tournaments
            .get(&id)
            .ok_or(ArenaError::TournamentNotFound { id })
    }

    fn tournament_mut(&mut self, id: TournamentId) -> Result<&mut Tournament> {
        self.tournaments
            .get_mut(&id)
            .ok_or(ArenaError::TournamentNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TournamentEngine {
        TournamentEngine::with_rng(StdRng::seed_from_u64(11))
    }

    fn codes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("CODE{:02}", i)).collect()
    }

    /// Creates a full tournament of `size` users, ids 1..=size, user 1 creating.
    fn full_tournament(engine: &mut TournamentEngine, size: u32) -> TournamentId {
        let id = engine.create("Cup", size, UserId(1), "user1").unwrap().id;
        for user in 2..=size as u64 {
            engine
                .join(id, UserId(user), &format!("user{}", user))
                .unwrap();
        }
        id
    }

    fn start(engine: &mut TournamentEngine, id: TournamentId) -> Vec<Assignment> {
        let plan = engine.plan_start(id, UserId(1)).unwrap();
        let needed = plan.rooms_needed();
        engine.commit_round(&plan, codes(needed)).unwrap()
    }

    fn next_round(engine: &mut TournamentEngine, advancement: Advancement) -> Vec<Assignment> {
        match advancement {
            Advancement::NextRound(plan) => {
                let needed = plan.rooms_needed();
                engine.commit_round(&plan, codes(needed)).unwrap()
            }
            other => panic!("expected a next round, got {:?}", other),
        }
    }

    #[test]
    fn test_create_enrolls_creator() {
        let mut engine = engine();
        let view = engine.create("  Friday Cup ", 4, UserId(1), "alice").unwrap();

        assert_eq!(view.name, "Friday Cup");
        assert_eq!(view.status, TournamentStatus::Pending);
        assert_eq!(view.participants.len(), 1);
        assert_eq!(view.participants[0].user_id, UserId(1));
        assert_eq!(engine.list().len(), 1);
    }

    #[test]
    fn test_create_validation() {
        let mut engine = engine();
        assert_eq!(
            engine.create("", 4, UserId(1), "a").unwrap_err().code(),
            "INVALID_PAYLOAD"
        );
        assert!(engine.create(&"n".repeat(65), 4, UserId(1), "a").is_err());
        assert!(engine.create("Cup", 1, UserId(1), "a").is_err());
        assert!(engine.create("Cup", 65, UserId(1), "a").is_err());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_join_rules() {
        let mut engine = engine();
        let id = engine.create("Cup", 3, UserId(1), "a").unwrap().id;

        assert_eq!(
            engine.join(id, UserId(1), "a").unwrap_err(),
            ArenaError::AlreadyJoined { id, user: UserId(1) }
        );
        assert!(!engine.join(id, UserId(2), "b").unwrap().full);
        assert!(engine.join(id, UserId(3), "c").unwrap().full);
        assert_eq!(
            engine.join(id, UserId(4), "d").unwrap_err(),
            ArenaError::CapacityExceeded { id, max: 3 }
        );
        assert_eq!(
            engine.join(TournamentId(99), UserId(4), "d").unwrap_err(),
            ArenaError::TournamentNotFound {
                id: TournamentId(99)
            }
        );
    }

    #[test]
    fn test_start_rules() {
        let mut engine = engine();
        let id = engine.create("Cup", 4, UserId(1), "a").unwrap().id;
        engine.join(id, UserId(2), "b").unwrap();

        assert_eq!(
            engine.plan_start(id, UserId(2)).unwrap_err(),
            ArenaError::NotCreator { id }
        );
        assert_eq!(
            engine.plan_start(id, UserId(1)).unwrap_err().code(),
            "INSUFFICIENT_PARTICIPANTS"
        );

        engine.join(id, UserId(3), "c").unwrap();
        engine.join(id, UserId(4), "d").unwrap();
        start(&mut engine, id);

        assert_eq!(engine.plan_start(id, UserId(1)).unwrap_err().code(), "NOT_JOINABLE");
        assert_eq!(engine.join(id, UserId(5), "e").unwrap_err().code(), "NOT_JOINABLE");
    }

    #[test]
    fn test_four_player_bracket() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 4);

        let round_one = start(&mut engine, id);
        assert_eq!(round_one.len(), 2);
        for assignment in &round_one {
            assert_ne!(assignment.participants[0], assignment.participants[1]);
            assert!(assignment.has_next_match);
        }
        let everyone: Vec<ParticipantId> = round_one
            .iter()
            .flat_map(|a| a.participants)
            .collect();
        let mut unique = everyone.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);

        let first_winner = round_one[0].participants[0];
        let second_winner = round_one[1].participants[0];

        let advancement = engine
            .record_result(round_one[0].match_id, [5, 3], first_winner)
            .unwrap();
        assert_eq!(advancement, Advancement::Pending);

        let advancement = engine
            .record_result(round_one[1].match_id, [5, 0], second_winner)
            .unwrap();
        let round_two = next_round(&mut engine, advancement);
        assert_eq!(round_two.len(), 1);
        let mut finalists = round_two[0].participants;
        finalists.sort();
        let mut expected = [first_winner, second_winner];
        expected.sort();
        assert_eq!(finalists, expected);
        assert!(!round_two[0].has_next_match);

        let advancement = engine
            .record_result(round_two[0].match_id, [5, 2], first_winner)
            .unwrap();
        assert_eq!(
            advancement,
            Advancement::Finished {
                champion: Some(first_winner)
            }
        );

        let tournament = engine.get(id).unwrap();
        assert_eq!(tournament.status, TournamentStatus::Finished);
        assert_eq!(tournament.matches.len(), 3);
        assert_eq!(tournament.current_round, 2);
        assert_eq!(tournament.participants.iter().filter(|p| p.eliminated).count(), 3);
        assert!(engine.list().is_empty());
    }

    #[test]
    fn test_odd_entrant_gets_a_bye() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 3);

        let round_one = start(&mut engine, id);
        assert_eq!(round_one.len(), 1);

        let tournament = engine.get(id).unwrap();
        let bye = tournament.matches.iter().find(|m| m.is_bye()).unwrap();
        assert_eq!(bye.status, MatchStatus::Finished);
        assert_eq!(bye.winner, bye.players[0]);
        assert!(bye.room_code.is_none());
        let bye_winner = bye.winner.unwrap();

        let played_winner = round_one[0].participants[1];
        let advancement = engine
            .record_result(round_one[0].match_id, [2, 5], played_winner)
            .unwrap();
        let final_round = next_round(&mut engine, advancement);
        let mut finalists = final_round[0].participants;
        finalists.sort();
        let mut expected = [bye_winner, played_winner];
        expected.sort();
        assert_eq!(finalists, expected);
    }

    #[test]
    fn test_five_players_need_three_rounds() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 5);
        let mut assignments = start(&mut engine, id);
        let mut rounds = 1;

        loop {
            let mut last = Advancement::Pending;
            for assignment in &assignments {
                last = engine
                    .record_result(assignment.match_id, [5, 1], assignment.participants[0])
                    .unwrap();
            }
            match last {
                Advancement::Finished { champion } => {
                    assert!(champion.is_some());
                    break;
                }
                other => {
                    assignments = next_round(&mut engine, other);
                    rounds += 1;
                }
            }
        }

        assert_eq!(rounds, 3);
        assert_eq!(engine.get(id).unwrap().status, TournamentStatus::Finished);
    }

    #[test]
    fn test_result_is_recorded_once() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 4);
        let round_one = start(&mut engine, id);
        let winner = round_one[0].participants[0];

        engine
            .record_result(round_one[0].match_id, [5, 1], winner)
            .unwrap();
        assert_eq!(
            engine
                .record_result(round_one[0].match_id, [5, 1], winner)
                .unwrap_err()
                .code(),
            "NOT_JOINABLE"
        );
    }

    #[test]
    fn test_winner_must_have_played() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 4);
        let round_one = start(&mut engine, id);
        let outsider = round_one[1].participants[0];

        assert!(engine
            .record_result(round_one[0].match_id, [5, 1], outsider)
            .is_err());
        assert_eq!(
            engine.get(id).unwrap().matches[0].status,
            MatchStatus::Ongoing
        );
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let mut engine = engine();
        let id = full_tournament(&mut engine, 4);
        let plan = engine.plan_start(id, UserId(1)).unwrap();

        assert!(engine.commit_round(&plan, codes(1)).is_err());
        let tournament = engine.get(id).unwrap();
        assert_eq!(tournament.status, TournamentStatus::Pending);
        assert!(tournament.matches.is_empty());

        engine.commit_round(&plan, codes(2)).unwrap();
        // a stale plan cannot be committed twice
        assert!(engine.commit_round(&plan, codes(2)).is_err());
        assert_eq!(engine.get(id).unwrap().matches.len(), 2);
    }
}
