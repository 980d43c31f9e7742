/* This file is part of DarkFi (https://dark.fi)
 *
 * Copyright (C) 2020-2024 Dyne.org foundation
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{collections::HashMap, sync::Arc};

use log::warn;
use rand::{rngs::OsRng, Rng};
use smol::lock::Mutex;

use crate::{Error, Result};

pub type SubscriptionId = u64;

/// Subscription to a [`Publisher`]. Created using `publisher.subscribe().await`.
pub struct Subscription<T> {
    id: SubscriptionId,
    recv_queue: smol::channel::Receiver<T>,
    parent: Arc<Publisher<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next message.
    pub async fn receive(&self) -> Result<T> {
        self.recv_queue.recv().await.or(Err(Error::PublisherDestroyed))
    }

    /// Take a queued message without waiting, if there is one.
    pub fn try_receive(&self) -> Option<T> {
        self.recv_queue.try_recv().ok()
    }

    // Must be called manually since async Drop is not possible in Rust
    pub async fn unsubscribe(&self) {
        self.parent.unsubscribe(self.id).await
    }
}

pub type PublisherPtr<T> = Arc<Publisher<T>>;

/// Simple broadcast (publish-subscribe) class
pub struct Publisher<T> {
    subs: Mutex<HashMap<SubscriptionId, smol::channel::Sender<T>>>,
}

impl<T: Clone> Publisher<T> {
    pub fn new() -> PublisherPtr<T> {
        Arc::new(Self { subs: Mutex::new(HashMap::new()) })
    }

    pub async fn subscribe(self: Arc<Self>) -> Subscription<T> {
        let (sender, recvr) = smol::channel::unbounded();
        let sub_id = OsRng.gen();

        self.subs.lock().await.insert(sub_id, sender);

        Subscription { id: sub_id, recv_queue: recvr, parent: self.clone() }
    }

    async fn unsubscribe(&self, sub_id: SubscriptionId) {
        self.subs.lock().await.remove(&sub_id);
    }

    /// Publish a message to all listening subscriptions.
    pub async fn notify(&self, msg: T) {
        for (id, sub) in self.subs.lock().await.iter() {
            if let Err(e) = sub.send(msg.clone()).await {
                warn!(target: "system::subscriber", "Error in notify() call for sub={id}: {e}");
            }
        }
    }
}
