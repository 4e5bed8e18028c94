//! A worked schema: a `users` dictionary and a `likes` many-to-many matrix
//! between users and posts, run through a handful of transactions,
//! including one rollback, to show the engine end to end.

use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use storage::clock::{SystemClock, Us};
use storage::container::dict::{DictEvent, DictUndo, Dictionary};
use storage::container::matrix::{Matrix, MatrixEvent, MatrixUndo};
use storage::container::{DictEntry, MatrixEntry, Multiplicity};
use storage::persister::file::FilePersister;
use storage::schema::SchemaFields;
use storage::stream::Stream;
use storage::txn::{Outcome, Storage, TxnContext};
use storage::typeid::{mutation_type_id, ReflectedMutation, TypeId128};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

impl DictEntry for User {
    type Key = u64;
    fn key(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub user_id: u64,
    pub post_id: u64,
}

impl MatrixEntry for Like {
    type Row = u64;
    type Col = u64;
    fn row(&self) -> u64 {
        self.user_id
    }
    fn col(&self) -> u64 {
        self.post_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Mutation {
    UsersUpdated { us: Us, data: User },
    UsersDeleted { us: Us, key: u64 },
    LikesUpdated { us: Us, data: Like },
    LikesDeleted { us: Us, row: u64, col: u64 },
}

impl ReflectedMutation for Mutation {
    fn type_id(&self) -> TypeId128 {
        match self {
            Mutation::UsersUpdated { .. } => mutation_type_id("UsersUpdated", &["us", "data"]),
            Mutation::UsersDeleted { .. } => mutation_type_id("UsersDeleted", &["us", "key"]),
            Mutation::LikesUpdated { .. } => mutation_type_id("LikesUpdated", &["us", "data"]),
            Mutation::LikesDeleted { .. } => mutation_type_id("LikesDeleted", &["us", "row", "col"]),
        }
    }
}

pub enum Undo {
    Users(DictUndo<User>),
    Likes(MatrixUndo<Like>),
}

pub struct Fields {
    pub users: Dictionary<User>,
    pub likes: Matrix<Like>,
}

impl Fields {
    pub fn new() -> Self {
        Fields { users: Dictionary::ordered(), likes: Matrix::new(Multiplicity::ManyToMany, true, true) }
    }

    pub fn add_user(&mut self, ctx: &mut TxnContext<Mutation, Undo>, user: User) {
        let us = ctx.next_us();
        let (_event, undo) = self.users.add(user.clone(), us);
        ctx.record(Mutation::UsersUpdated { us, data: user }, Undo::Users(undo));
    }

    pub fn remove_user(&mut self, ctx: &mut TxnContext<Mutation, Undo>, id: u64) {
        let us = ctx.next_us();
        if let Some((_event, undo)) = self.users.erase(&id, us) {
            ctx.record(Mutation::UsersDeleted { us, key: id }, Undo::Users(undo));
        }
    }

    pub fn add_like(&mut self, ctx: &mut TxnContext<Mutation, Undo>, like: Like) {
        let (events, undos) = self.likes.add(like, || ctx.next_us());
        for (event, undo) in events.into_iter().zip(undos.into_iter()) {
            let mutation = match event {
                MatrixEvent::Updated { us, data } => Mutation::LikesUpdated { us, data },
                MatrixEvent::Deleted { us, row, col } => Mutation::LikesDeleted { us, row, col },
            };
            ctx.record(mutation, Undo::Likes(undo));
        }
    }
}

impl SchemaFields<Mutation, Undo> for Fields {
    fn apply_replay(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::UsersUpdated { us, data } => self.users.apply_event(DictEvent::Updated { us, data }),
            Mutation::UsersDeleted { us, key } => self.users.apply_event(DictEvent::Deleted { us, key }),
            Mutation::LikesUpdated { us, data } => self.likes.apply_event(MatrixEvent::Updated { us, data }),
            Mutation::LikesDeleted { us, row, col } => {
                self.likes.apply_event(MatrixEvent::Deleted { us, row, col })
            }
        }
    }

    fn apply_undo(&mut self, undo: Undo) {
        match undo {
            Undo::Users(undo) => self.users.apply_undo(undo),
            Undo::Likes(undo) => self.likes.apply_undo(undo),
        }
    }
}

fn main() -> storage::CResult<()> {
    let data_dir = tempdir::TempDir::new("storage-example")?;
    let log_path = data_dir.path().join("storage.log");

    let persister: FilePersister<Mutation> = FilePersister::open(&log_path, false)?;
    let stream: Stream<Mutation> = Stream::new(Box::new(persister));

    let engine = Arc::new(Storage::open_master(Fields::new(), stream, Box::new(SystemClock))?);

    engine.write(|fields, ctx| {
        fields.add_user(ctx, User { id: 1, name: "ada".to_string() });
        fields.add_user(ctx, User { id: 2, name: "grace".to_string() });
        Outcome::<(), ()>::Commit(())
    })?;

    engine.write(|fields, ctx| {
        fields.add_like(ctx, Like { user_id: 1, post_id: 100 });
        fields.add_like(ctx, Like { user_id: 2, post_id: 100 });
        Outcome::<(), ()>::Commit(())
    })?;

    // A transaction that changes its mind partway through: adding a like
    // that's immediately superseded, then rolling back entirely.
    let rolled_back = engine.write(|fields, ctx| {
        fields.add_like(ctx, Like { user_id: 1, post_id: 200 });
        Outcome::<(), &'static str>::Rollback(Some("changed my mind"))
    })?;
    println!("speculative transaction outcome: {:?}", matches!(rolled_back, Outcome::Rollback(_)));

    engine.read(|fields| {
        println!("users: {}", fields.users.size());
        println!("likes on post 100: {}", fields.likes.col_cells(&100).len());
        println!("likes on post 200 (should be 0, rolled back): {}", fields.likes.col_cells(&200).len());
    });

    let status = engine.status();
    println!("persisted records: {}, last_us: {}", status.record_count, status.last_us);

    Ok(())
}
