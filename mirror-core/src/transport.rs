//! Message transport between the simulation and the mirror.
//!
//! [`Transport`] is the seam: anything that can deliver [`Message`]s by topic
//! works. [`LocalBus`] is the in-process implementation; [`SceneClient`]
//! wires a transport to a [`MessageIntake`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::intake::MessageIntake;
use crate::message::{Message, MessageKind, RequestMsg, ResponsePayload};
use crate::request::SCENE_INFO;

/// Topic names.
pub mod topics {
    /// Scene descriptions.
    pub const SCENE: &str = "~/scene";
    /// Model descriptions.
    pub const MODEL: &str = "~/model/info";
    /// Visual create/update/delete.
    pub const VISUAL: &str = "~/visual";
    /// Link descriptions.
    pub const LINK: &str = "~/link";
    /// Pose updates.
    pub const POSE: &str = "~/pose/info";
    /// Skeleton poses.
    pub const SKELETON_POSE: &str = "~/skeleton_pose/info";
    /// Light descriptions.
    pub const LIGHT: &str = "~/light";
    /// Joint descriptions.
    pub const JOINT: &str = "~/joint";
    /// Sensor descriptions.
    pub const SENSOR: &str = "~/sensor";
    /// Selection changes.
    pub const SELECTION: &str = "~/selection";
    /// Requests, in both directions.
    pub const REQUEST: &str = "~/request";
    /// Responses, in both directions.
    pub const RESPONSE: &str = "~/response";

    /// Topics whose messages go straight into the intake.
    pub const INBOUND: [&str; 11] = [
        SCENE,
        MODEL,
        VISUAL,
        LINK,
        POSE,
        SKELETON_POSE,
        LIGHT,
        JOINT,
        SENSOR,
        SELECTION,
        REQUEST,
    ];
}

/// Topic a message of `kind` travels on.
#[must_use]
pub const fn topic_for(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Scene => topics::SCENE,
        MessageKind::Model => topics::MODEL,
        MessageKind::Link => topics::LINK,
        MessageKind::Visual => topics::VISUAL,
        MessageKind::Pose => topics::POSE,
        MessageKind::SkeletonPose => topics::SKELETON_POSE,
        MessageKind::Light => topics::LIGHT,
        MessageKind::Joint => topics::JOINT,
        MessageKind::Sensor => topics::SENSOR,
        MessageKind::Selection => topics::SELECTION,
        MessageKind::Request => topics::REQUEST,
        MessageKind::Response => topics::RESPONSE,
    }
}

/// A message the mirror wants published.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Destination topic.
    pub topic: String,
    /// Payload.
    pub message: Message,
}

impl Outbound {
    /// Create an outbound message.
    #[must_use]
    pub fn new(topic: impl Into<String>, message: Message) -> Self {
        Self {
            topic: topic.into(),
            message,
        }
    }
}

/// Callback invoked for every message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Handle returned by [`Transport::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Topic-based publish/subscribe.
pub trait Transport: Send + Sync {
    /// Register `handler` for `topic`.
    fn subscribe(&self, topic: &str, handler: MessageHandler) -> SubscriptionId;

    /// Remove a subscription. Returns whether it existed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Deliver `message` to every subscriber of `topic`.
    ///
    /// Returns the number of handlers invoked.
    fn publish(&self, topic: &str, message: Message) -> usize;
}

type Subscribers = HashMap<String, Vec<(SubscriptionId, MessageHandler)>>;

/// In-process transport. Handlers run on the publishing thread.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscribers: Arc<RwLock<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl LocalBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let topics: HashMap<&str, usize> = subscribers
            .iter()
            .map(|(topic, subs)| (topic.as_str(), subs.len()))
            .collect();
        f.debug_struct("LocalBus").field("topics", &topics).finish()
    }
}

impl Transport for LocalBus {
    fn subscribe(&self, topic: &str, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut found = false;
        for subs in subscribers.values_mut() {
            let before = subs.len();
            subs.retain(|(sub, _)| *sub != id);
            found |= subs.len() != before;
        }
        subscribers.retain(|_, subs| !subs.is_empty());
        found
    }

    fn publish(&self, topic: &str, message: Message) -> usize {
        // Handlers may publish themselves, so call them outside the lock.
        let handlers: Vec<MessageHandler> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(message.clone());
        }
        handlers.len()
    }
}

/// Subscribes a [`MessageIntake`] to every inbound topic.
///
/// Responses are only of interest when they answer this client's own
/// `scene_info` request; the enclosed scene is then staged as a scene
/// message. Subscriptions are released on drop.
pub struct SceneClient {
    transport: Arc<dyn Transport>,
    world_name: String,
    subscriptions: Vec<SubscriptionId>,
    scene_request: Arc<AtomicU64>,
    next_request_id: AtomicU64,
}

impl SceneClient {
    /// Subscribe `intake` to the transport.
    pub fn connect(
        transport: Arc<dyn Transport>,
        intake: MessageIntake,
        world_name: impl Into<String>,
    ) -> Self {
        let mut subscriptions = Vec::with_capacity(topics::INBOUND.len() + 1);
        for topic in topics::INBOUND {
            let intake = intake.clone();
            subscriptions.push(transport.subscribe(
                topic,
                Arc::new(move |message| intake.enqueue(message)),
            ));
        }

        let scene_request = Arc::new(AtomicU64::new(0));
        let pending = Arc::clone(&scene_request);
        subscriptions.push(transport.subscribe(
            topics::RESPONSE,
            Arc::new(move |message| {
                let Message::Response(response) = message else {
                    return;
                };
                let expected = pending.load(Ordering::Acquire);
                if expected == 0 || response.id != expected || response.request != SCENE_INFO {
                    tracing::trace!("Ignoring response {}", response.id);
                    return;
                }
                match response.payload {
                    ResponsePayload::Scene(scene) => {
                        pending.store(0, Ordering::Release);
                        tracing::info!("Received scene for request {}", response.id);
                        intake.enqueue(Message::Scene(scene));
                    }
                    _ => tracing::warn!(
                        "Response {} to scene request carries no scene",
                        response.id
                    ),
                }
            }),
        ));

        Self {
            transport,
            world_name: world_name.into(),
            subscriptions,
            scene_request,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Ask the simulation for the full scene. Returns the request id.
    pub fn request_scene(&self) -> u64 {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.scene_request.store(id, Ordering::Release);
        let request = RequestMsg::new(id, SCENE_INFO, self.world_name.clone());
        let delivered = self
            .transport
            .publish(topics::REQUEST, Message::Request(request));
        tracing::debug!("Scene request {id} delivered to {delivered} subscribers");
        id
    }

    /// Whether a `scene_info` request is still unanswered.
    #[must_use]
    pub fn awaiting_scene(&self) -> bool {
        self.scene_request.load(Ordering::Acquire) != 0
    }

    /// Publish messages produced by a tick.
    pub fn publish_outbound(&self, outbound: &[Outbound]) {
        for item in outbound {
            self.transport.publish(&item.topic, item.message.clone());
        }
    }
}

impl std::fmt::Debug for SceneClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneClient")
            .field("world_name", &self.world_name)
            .field("subscriptions", &self.subscriptions.len())
            .field("awaiting_scene", &self.awaiting_scene())
            .finish()
    }
}

impl Drop for SceneClient {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.transport.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ResponseMsg, SceneMsg, SelectionMsg};
    use crate::{Pose, PoseMsg};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_publish_reaches_topic_subscribers_only() {
        let bus = LocalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(
            topics::POSE,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let pose = Message::Pose(PoseMsg::new("box", Pose::default()));
        assert_eq!(bus.publish(topics::POSE, pose.clone()), 1);
        assert_eq!(bus.publish(topics::VISUAL, pose), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = LocalBus::new();
        let id = bus.subscribe(topics::SELECTION, Arc::new(|_| {}));
        assert_eq!(bus.subscriber_count(topics::SELECTION), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(topics::SELECTION), 0);
    }

    #[test]
    fn test_client_stages_inbound_messages() {
        let bus = Arc::new(LocalBus::new());
        let intake = MessageIntake::new();
        let _client = SceneClient::connect(bus.clone(), intake.clone(), "default");

        bus.publish(
            topics::SELECTION,
            Message::Selection(SelectionMsg {
                name: "box".into(),
                selected: true,
            }),
        );
        assert_eq!(intake.len(), 1);
    }

    #[test]
    fn test_scene_response_matched_by_id() {
        let bus = Arc::new(LocalBus::new());
        let intake = MessageIntake::new();
        let client = SceneClient::connect(bus.clone(), intake.clone(), "default");

        let id = client.request_scene();
        assert!(client.awaiting_scene());
        // The request loops back through the bus like any other request.
        assert_eq!(intake.drain().requests.len(), 1);

        let response = |id| {
            Message::Response(ResponseMsg {
                id,
                request: SCENE_INFO.into(),
                response: "success".into(),
                payload: ResponsePayload::Scene(SceneMsg::default()),
            })
        };
        bus.publish(topics::RESPONSE, response(id + 100));
        assert!(intake.is_empty());

        bus.publish(topics::RESPONSE, response(id));
        assert!(!client.awaiting_scene());
        assert_eq!(intake.drain().scenes.len(), 1);
    }

    #[test]
    fn test_drop_releases_subscriptions() {
        let bus = Arc::new(LocalBus::new());
        let client = SceneClient::connect(bus.clone(), MessageIntake::new(), "default");
        assert_eq!(bus.subscriber_count(topics::POSE), 1);
        drop(client);
        assert_eq!(bus.subscriber_count(topics::POSE), 0);
        assert_eq!(bus.subscriber_count(topics::RESPONSE), 0);
    }
}
