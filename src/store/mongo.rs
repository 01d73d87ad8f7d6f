use std::collections::HashMap;

use log::info;
use mongodb::bson::doc;
use mongodb::options::UpdateOptions;
use mongodb::sync::{Client, Collection};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{BallotId, BallotStatus};

use super::StatusBackend;

const DATABASE: &str = "evoting_db";
const COLLECTION: &str = "ballots";

/// One status document, the shape the legacy deployments left behind.
#[derive(Debug, Serialize, Deserialize)]
struct StatusDoc {
    ballot_id: BallotId,
    election_id: String,
    status: BallotStatus,
}

/// Ballot status kept in the `ballots` collection of a local MongoDB.
/// Writes are acknowledged single-document upserts, so each status change
/// is durable before `set_status` returns.
pub struct MongoStatusBackend {
    ballots: Collection<StatusDoc>,
}

impl MongoStatusBackend {
    pub fn connect(uri: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)?;
        let ballots = client.database(DATABASE).collection(COLLECTION);
        info!("Connected to ballot status database");
        Ok(Self { ballots })
    }
}

impl StatusBackend for MongoStatusBackend {
    fn statuses(&self, election_id: &str) -> Result<HashMap<BallotId, BallotStatus>> {
        let cursor = self.ballots.find(doc! {"election_id": election_id}, None)?;
        let mut statuses = HashMap::new();
        for document in cursor {
            let document = document?;
            statuses.insert(document.ballot_id, document.status);
        }
        Ok(statuses)
    }

    fn set_status(&self, election_id: &str, ballot_id: &str, status: BallotStatus) -> Result<()> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.ballots.update_one(
            doc! {"ballot_id": ballot_id, "election_id": election_id},
            doc! {"$set": {"status": status}},
            options,
        )?;
        Ok(())
    }
}
